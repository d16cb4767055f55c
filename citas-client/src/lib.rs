//! Async client for the SaludEscolar HTTP API.
//!
//! The backend is consumed as a black box: typed models where the shape
//! is stable (users, professionals, login) and raw `serde_json::Value`
//! for the appointment collections, which go through `citas-normalize`
//! before anything displays them.

mod feed;

pub use feed::AgendaFeed;

use std::time::Duration;

use chrono::Utc;
use citas_core::AgendaSnapshot;
use citas_normalize::build_agenda;
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://api-ep-3czc.onrender.com";

/// External web page where the actual booking happens.
pub const BOOKING_URL: &str = "https://saludescolar-22785.web.app/";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Fixed interval of the silent agenda re-poll.
    pub refresh_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 15,
            refresh_interval_secs: 60,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Error de red o de respuesta; el `Display` es el mensaje que ven las
/// pantallas, no se propagan códigos estructurados más allá de aquí.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No se pudo conectar con el servidor ({0})")]
    Connection(String),
    #[error("La petición tardó demasiado en responder")]
    Timeout,
    #[error("El servidor respondió {status}: {body}")]
    Status { status: u16, body: String },
    #[error("No se pudo leer la respuesta: {0}")]
    Decode(String),
    #[error("Error de red: {0}")]
    Http(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub rol: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct User {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub nombre: String,
    pub rol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grado: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grupo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nip: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Professional {
    pub id: String,
    pub nombre: String,
    pub especialidad: String,
    pub nip: String,
    pub rol: String,
}

#[derive(Serialize)]
struct LoginRequest {
    nombre: String,
    nip: String,
}

/// HTTP client over the SaludEscolar API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Client against the production host with default timeouts.
    pub fn default_production() -> Self {
        Self::new(&ClientConfig::default())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn classify(&self, err: reqwest::Error) -> ApiError {
        if err.is_connect() {
            ApiError::Connection(self.base_url.clone())
        } else if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Http(err.to_string())
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn ensure_success(&self, response: Response) -> Result<(), ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|err| self.classify(err))?;
        self.decode(response).await
    }

    /// Login por nombre + NIP. El nombre viaja recortado y en
    /// minúsculas, igual que lo espera el backend.
    pub async fn login(&self, nombre: &str, nip: &str) -> Result<Session, ApiError> {
        let (nombre, nip) = normalized_credentials(nombre, nip);
        let response = self
            .http
            .post(self.url("/api/login"))
            .json(&LoginRequest { nombre, nip })
            .send()
            .await
            .map_err(|err| self.classify(err))?;
        self.decode(response).await
    }

    pub async fn user(&self, user_id: &str) -> Result<User, ApiError> {
        self.get_json(&format!("/api/usuarios/{user_id}")).await
    }

    pub async fn users(&self) -> Result<Vec<User>, ApiError> {
        self.get_json("/api/usuarios").await
    }

    pub async fn create_user(&self, user: &User) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url("/api/usuarios"))
            .json(user)
            .send()
            .await
            .map_err(|err| self.classify(err))?;
        self.ensure_success(response).await
    }

    pub async fn update_user(&self, user_id: &str, user: &User) -> Result<(), ApiError> {
        let response = self
            .http
            .put(self.url(&format!("/api/usuarios/{user_id}")))
            .json(user)
            .send()
            .await
            .map_err(|err| self.classify(err))?;
        self.ensure_success(response).await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/usuarios/{user_id}")))
            .send()
            .await
            .map_err(|err| self.classify(err))?;
        self.ensure_success(response).await
    }

    /// Profesionales filtrados por rol (`enfermero`, `psicologo`).
    pub async fn professionals(&self, rol: &str) -> Result<Vec<Professional>, ApiError> {
        self.get_json(&format!("/api/profesionales?rol={rol}")).await
    }

    /// Todas las citas del usuario, tal como llegan (colección general).
    pub async fn appointments(&self, user_id: &str) -> Result<Vec<Value>, ApiError> {
        self.get_json(&format!("/api/citas/{user_id}")).await
    }

    /// Citas programadas para hoy.
    pub async fn scheduled_today(&self, user_id: &str) -> Result<Vec<Value>, ApiError> {
        self.get_json(&format!("/api/citas/hoy/{user_id}")).await
    }

    /// Todas las citas programadas.
    pub async fn all_scheduled(&self, user_id: &str) -> Result<Vec<Value>, ApiError> {
        self.get_json(&format!("/api/citas/programadas/{user_id}")).await
    }

    /// Citas ya atendidas.
    pub async fn completed(&self, user_id: &str) -> Result<Vec<Value>, ApiError> {
        self.get_json(&format!("/api/citas/hechas/{user_id}")).await
    }

    /// Citas canceladas.
    pub async fn cancelled(&self, user_id: &str) -> Result<Vec<Value>, ApiError> {
        self.get_json(&format!("/api/citas/canceladas/{user_id}")).await
    }

    pub async fn mark_done(&self, cita_id: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .put(self.url(&format!("/api/citas/marcar-hecha/{cita_id}")))
            .send()
            .await
            .map_err(|err| self.classify(err))?;
        self.ensure_success(response).await
    }

    pub async fn cancel(&self, cita_id: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .put(self.url(&format!("/api/citas/cancelar/{cita_id}")))
            .send()
            .await
            .map_err(|err| self.classify(err))?;
        self.ensure_success(response).await
    }

    /// One full agenda cycle: the three collections are fetched
    /// concurrently and a source that fails is logged and treated as
    /// empty, so a partial outage never takes down the whole agenda.
    pub async fn fetch_agenda(&self, user_id: &str) -> AgendaSnapshot {
        let (general, hechas, canceladas) = tokio::join!(
            self.appointments(user_id),
            self.completed(user_id),
            self.cancelled(user_id),
        );

        let general = degrade("citas", general);
        let hechas = degrade("hechas", hechas);
        let canceladas = degrade("canceladas", canceladas);

        build_agenda(&general, &hechas, &canceladas, Utc::now())
    }
}

fn degrade(source: &str, result: Result<Vec<Value>, ApiError>) -> Vec<Value> {
    match result {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(source, error = %err, "Fuente de citas no disponible, se trata como vacía");
            Vec::new()
        }
    }
}

fn normalized_credentials(nombre: &str, nip: &str) -> (String, String) {
    (nombre.trim().to_lowercase(), nip.trim().to_string())
}

/// URL of the external booking page for the chosen professional, with
/// every parameter percent-encoded.
pub fn booking_url(user_id: &str, profesional: &Professional, rol: &str) -> Url {
    Url::parse_with_params(
        BOOKING_URL,
        &[
            ("usuarioId", user_id),
            ("paciente", user_id),
            ("nip", profesional.nip.as_str()),
            ("profesional", profesional.nombre.as_str()),
            ("rol", rol),
            ("profesionalId", profesional.id.as_str()),
        ],
    )
    .expect("valid booking URL")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_url_loses_its_trailing_slash() {
        let client = ApiClient::new(&ClientConfig {
            base_url: "https://api.example.com/".to_string(),
            ..ClientConfig::default()
        });
        assert_eq!(client.url("/api/login"), "https://api.example.com/api/login");
    }

    #[test]
    fn credentials_are_trimmed_and_lowercased() {
        let (nombre, nip) = normalized_credentials("  Armando Mata ", " 1234 ");
        assert_eq!(nombre, "armando mata");
        assert_eq!(nip, "1234");
    }

    #[test]
    fn booking_url_carries_every_parameter_encoded() {
        let profesional = Professional {
            id: "prof-7".to_string(),
            nombre: "Laura Sánchez".to_string(),
            especialidad: "Enfermería".to_string(),
            nip: "9876".to_string(),
            rol: "enfermero".to_string(),
        };

        let url = booking_url("est-1", &profesional, "enfermero");
        assert_eq!(url.host_str(), Some("saludescolar-22785.web.app"));

        let query = url.query().unwrap();
        assert!(query.contains("usuarioId=est-1"));
        assert!(query.contains("paciente=est-1"));
        assert!(query.contains("nip=9876"));
        assert!(query.contains("profesional=Laura+S%C3%A1nchez"));
        assert!(query.contains("rol=enfermero"));
        assert!(query.contains("profesionalId=prof-7"));
    }

    #[test]
    fn user_decodes_with_every_optional_field_missing() {
        let user: User =
            serde_json::from_value(json!({"nombre": "ana", "rol": "estudiante"})).unwrap();
        assert_eq!(user.nombre, "ana");
        assert_eq!(user.id, "");
        assert_eq!(user.nip, None);
    }

    #[test]
    fn new_user_payload_omits_the_empty_id() {
        let user = User {
            nombre: "ana".to_string(),
            rol: "estudiante".to_string(),
            grado: Some("3".to_string()),
            grupo: Some("B".to_string()),
            nip: Some("1234".to_string()),
            ..User::default()
        };

        let payload = serde_json::to_value(&user).unwrap();
        assert!(payload.get("id").is_none());
        assert!(payload.get("email").is_none());
        assert_eq!(payload["nip"], "1234");
    }

    #[test]
    fn professional_decodes_from_api_shape() {
        let profesional: Professional = serde_json::from_value(json!({
            "id": "prof-7",
            "nombre": "Laura Sánchez",
            "especialidad": "Enfermería",
            "nip": "9876",
            "rol": "enfermero"
        }))
        .unwrap();
        assert_eq!(profesional.nombre, "Laura Sánchez");
        assert_eq!(profesional.rol, "enfermero");
    }
}
