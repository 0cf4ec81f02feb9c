//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3.0 document served at `/api-docs/openapi.json`.

use axum::Json;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::db::UserResponse;
use crate::handlers::{
    HealthResponse, LoginForm, MessageResponse, ReadyResponse, SignupRequest, TokenResponse,
};

/// Keygate API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Keygate API",
        version = "0.1.0",
        description = r#"
## Password login with WebAuthn second factor

1. **Sign up** via `POST /api/v1/auth/signup`
2. **Log in** via `POST /api/v1/auth/token` to get a bearer token
3. **Register** an authenticator: `GET /api/v1/authn/register/public_key`, pass the
   options to `navigator.credentials.create()`, then `POST /api/v1/authn/register`
4. **Authenticate** with it: `GET /api/v1/authn/auth/public_key`, pass the options to
   `navigator.credentials.get()`, then `POST /api/v1/authn/auth`

The ceremony endpoints require the bearer token and keep the outstanding
challenge under a signed session cookie, so the browser must send cookies.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    tags(
        (name = "Auth", description = "Account creation and password login"),
        (name = "WebAuthn", description = "Credential registration and assertion ceremonies"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::auth::signup_handler,
        crate::handlers::auth::token_handler,
        crate::handlers::auth::me_handler,
        crate::handlers::authn::register_options_handler,
        crate::handlers::authn::register_handler,
        crate::handlers::authn::auth_options_handler,
        crate::handlers::authn::auth_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            SignupRequest,
            LoginForm,
            TokenResponse,
            MessageResponse,
            UserResponse,
        )
    ),
    modifiers(&BearerSecurity)
)]
pub struct ApiDoc;

/// Registers the `bearer_token` security scheme used by protected paths
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// GET /api-docs/openapi.json
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
