//! Test client helpers.

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use emissary_server::{AppState, Application, Settings, metrics::detached_handle};
use http_body_util::BodyExt;
use tower::ServiceExt;

use super::plugins::registry;

/// Helper para tests de integracion HTTP.
pub struct TestClient {
    app: Router,
    state: AppState,
}

impl TestClient {
    /// Arranca la aplicacion con los settings dados y el registro de prueba.
    pub fn start(settings: Settings) -> Self {
        let app = Application::start_with_registry(settings, &registry())
            .expect("application failed to start");
        let router = app.router(detached_handle());

        Self {
            app: router,
            state: app.state().clone(),
        }
    }

    /// Estado compartido de la aplicacion.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Hace un GET request.
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.get_with_headers(uri, vec![]).await
    }

    /// Hace un GET request con headers personalizados.
    pub async fn get_with_headers(&self, uri: &str, headers: Vec<(&str, &str)>) -> TestResponse {
        let mut builder = Request::builder().uri(uri).method("GET");

        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        self.request(builder.body(Body::empty()).unwrap()).await
    }

    /// Hace un POST con body JSON.
    pub async fn post_json(&self, uri: &str, body: &str) -> TestResponse {
        self.post_json_with_headers(uri, body, vec![]).await
    }

    /// Hace un POST con body JSON y headers personalizados.
    pub async fn post_json_with_headers(
        &self,
        uri: &str,
        body: &str,
        headers: Vec<(&str, &str)>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .uri(uri)
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json");

        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        self.request(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Ejecuta un request arbitrario.
    async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        TestResponse::from_response(response).await
    }
}

/// Wrapper sobre Response con helpers para assertions.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    async fn from_response(response: Response<Body>) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes()
            .to_vec();

        Self {
            status,
            headers,
            body,
        }
    }

    /// Retorna el body como string.
    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).expect("Body is not valid UTF-8")
    }

    /// Parsea el body como JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse JSON")
    }

    /// Retorna un header especifico.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Verifica que el status sea el esperado.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Verifica que un header exista.
    pub fn assert_header_exists(&self, name: &str) -> &Self {
        assert!(
            self.headers.contains_key(name),
            "Expected header '{}' to exist",
            name
        );
        self
    }

    /// Verifica que un header tenga un valor especifico.
    pub fn assert_header(&self, name: &str, expected: &str) -> &Self {
        let value = self
            .header(name)
            .unwrap_or_else(|| panic!("Header '{}' not found", name));

        assert_eq!(
            value, expected,
            "Expected header '{}' to be '{}' but got '{}'",
            name, expected, value
        );
        self
    }
}

/// Crea un TestClient con los settings de prueba por defecto.
pub fn client() -> TestClient {
    TestClient::start(Settings::for_tests())
}

/// Crea un TestClient con el backend y las transformaciones dados.
pub fn client_with(backend: &str, transformations: &[&str]) -> TestClient {
    let mut settings = Settings::for_tests();
    settings.plugins.cache_backend = Some(backend.to_string());
    settings.plugins.transformations = transformations.iter().map(|t| t.to_string()).collect();
    TestClient::start(settings)
}
