//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI specification for the slice-dl REST API using utoipa
//! for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the slice-dl REST API
///
/// The spec can be accessed via:
/// - `/api/v1/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "slice-dl REST API",
        version = "0.1.0",
        description = "Start jobs that download a time range of a remote video, follow their progress and fetch the result",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::start_job,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::delete_job,
        crate::api::routes::job_events,
        crate::api::routes::download_file,

        // Channel
        crate::api::routes::channel,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        crate::types::JobId,
        crate::types::Phase,
        crate::types::JobEvent,
        crate::types::JobInfo,
        crate::types::ProgressSnapshot,
        crate::types::StartRequest,
        crate::types::StartResponse,

        crate::config::Config,
        crate::config::DownloadConfig,
        crate::config::ToolsConfig,
        crate::config::ProgressConfig,
        crate::config::RetentionConfig,
        crate::config::ApiConfig,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Jobs - Start slices, follow their progress, download the result"),
        (name = "channel", description = "WebSocket channel - Start and follow jobs over one connection"),
        (name = "system", description = "System endpoints - Health checks and OpenAPI spec"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security addon to add API key authentication scheme to OpenAPI spec
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
