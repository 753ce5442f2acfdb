//! API client for the gasrun delivery backend.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests: login, order listing and detail, delivery confirmation with
//! the casco payload, the container-group catalog, and location upload.
//!
//! The client also implements the collaborator traits the core
//! components consume (`GroupDirectory`, `DeliveryApi`, `LocationSink`),
//! so those components never depend on it directly.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::SessionData;
use crate::catalog::GroupDirectory;
use crate::config::Config;
use crate::models::{
    ContainerGroup, ContainerOption, GroupDetail, LocationSample, OrderDetail, OrderListPage,
};
use crate::reconcile::{DeliveryApi, ReturnPayload};

use super::ApiError;

/// HTTP request timeout in seconds.
/// The backend answers fast; 10s fails quickly on dead mobile links.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default page size for order listings
const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Raw login response. The backend returns the user fields flat next to
/// the token.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    id: i64,
    nome: String,
    perfil: String,
    token: String,
}

/// How the driver reached out to the customer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactChannel {
    Telefone,
    Whatsapp,
}

/// API client for the gasrun backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client against an explicit base URL (used at login time,
    /// before the URL has been persisted).
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a client from the saved configuration. Fails with
    /// `NotConfigured` when the driver has not completed setup.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let base_url = config.server_url().ok_or(ApiError::NotConfigured)?;
        Self::new(&base_url)
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    /// Authenticate against the backend and return session data.
    pub async fn login(&self, login: &str, senha: &str) -> Result<SessionData, ApiError> {
        let url = format!("{}/api/login", self.base_url);
        let body = serde_json::json!({ "login": login, "senha": senha });

        let response = self.client.post(&url).json(&body).send().await?;
        let response = Self::check_response(response).await?;
        let auth: LoginResponse = response.json().await?;

        debug!(user_id = auth.id, "Login succeeded");
        Ok(SessionData {
            token: auth.token,
            user_id: auth.id,
            name: auth.nome,
            role: auth.perfil,
            created_at: Utc::now(),
        })
    }

    /// Fetch the driver's active orders, paged.
    pub async fn fetch_orders(
        &self,
        driver_id: i64,
        page: u32,
    ) -> Result<OrderListPage, ApiError> {
        let url = format!("{}/api/pedidos", self.base_url);
        self.get_with_query(
            &url,
            &[
                ("entregador_id", driver_id.to_string()),
                ("page", page.to_string()),
                ("limit", DEFAULT_PAGE_LIMIT.to_string()),
            ],
        )
        .await
    }

    /// Fetch the driver's finished orders, paged.
    pub async fn fetch_finished_orders(
        &self,
        driver_id: i64,
        page: u32,
    ) -> Result<OrderListPage, ApiError> {
        let url = format!("{}/api/pedidos/finalizados", self.base_url);
        self.get_with_query(
            &url,
            &[
                ("entregador_id", driver_id.to_string()),
                ("page", page.to_string()),
                ("limit", DEFAULT_PAGE_LIMIT.to_string()),
            ],
        )
        .await
    }

    /// Fetch one order with its line items.
    pub async fn fetch_order_detail(&self, order_id: i64) -> Result<OrderDetail, ApiError> {
        let url = format!("{}/api/pedidos/{}", self.base_url, order_id);
        self.get(&url).await
    }

    /// Record that the driver contacted the customer. Failures are
    /// logged and swallowed; contact logging never blocks the driver.
    pub async fn register_contact(
        &self,
        order_id: i64,
        customer_id: i64,
        channel: ContactChannel,
    ) {
        let url = format!("{}/api/pedidos/registrar-contato", self.base_url);
        let body = serde_json::json!({
            "pedido_id": order_id,
            "cliente_id": customer_id,
            "tipo_contato": channel,
        });

        let result = async {
            let response = self
                .client
                .post(&url)
                .headers(self.auth_headers()?)
                .json(&body)
                .send()
                .await?;
            Self::check_response(response).await?;
            Ok::<_, ApiError>(())
        }
        .await;

        match result {
            Ok(()) => debug!(order_id, ?channel, "Contact registered"),
            Err(e) => warn!(order_id, error = %e, "Failed to register contact"),
        }
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("token is not a valid header".into()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(url)
            .headers(self.auth_headers()?)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }

    async fn get_with_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .get(url)
            .headers(self.auth_headers()?)
            .query(query)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }

    async fn post_unit<B: Serialize>(&self, url: &str, body: &B) -> Result<(), ApiError> {
        let response = self
            .client
            .post(url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

/// The confirmation body: `cascos` is present only when there is a
/// settlement to report; a trivial confirmation sends the id alone.
fn confirm_body(order_id: i64, cascos: Option<&ReturnPayload>) -> serde_json::Value {
    match cascos {
        Some(payload) => serde_json::json!({ "pedido_id": order_id, "cascos": payload }),
        None => serde_json::json!({ "pedido_id": order_id }),
    }
}

#[async_trait]
impl GroupDirectory for ApiClient {
    async fn fetch_groups(&self) -> Result<Vec<ContainerGroup>, ApiError> {
        let url = format!("{}/api/grupos-botijas", self.base_url);
        self.get(&url).await
    }

    async fn fetch_group_detail(&self, group_id: i64) -> Result<GroupDetail, ApiError> {
        let url = format!("{}/api/grupos-botijas/{}", self.base_url, group_id);
        self.get(&url).await
    }

    async fn fetch_group_containers(
        &self,
        group_id: i64,
    ) -> Result<Vec<ContainerOption>, ApiError> {
        let url = format!("{}/api/grupos-botijas/cascos/{}", self.base_url, group_id);
        self.get(&url).await
    }
}

#[async_trait]
impl DeliveryApi for ApiClient {
    async fn confirm_delivery(
        &self,
        order_id: i64,
        cascos: Option<&ReturnPayload>,
    ) -> Result<(), ApiError> {
        let url = format!("{}/api/pedidos/confirmar-entrega", self.base_url);
        debug!(order_id, with_cascos = cascos.is_some(), "Confirming delivery");
        self.post_unit(&url, &confirm_body(order_id, cascos)).await
    }
}

#[async_trait]
impl crate::location::LocationSink for ApiClient {
    async fn send_location(&self, sample: &LocationSample) -> Result<(), ApiError> {
        let url = format!("{}/api/entregadores/localizacao", self.base_url);
        self.post_unit(&url, sample).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::ContainerReturn;

    #[test]
    fn test_base_url_normalization() {
        let client = ApiClient::new("https://gas.example.com/").unwrap();
        assert_eq!(client.base_url, "https://gas.example.com");

        let client = ApiClient::new("https://gas.example.com").unwrap();
        assert_eq!(client.base_url, "https://gas.example.com");
    }

    #[test]
    fn test_from_config_requires_server_url() {
        let err = ApiClient::from_config(&Config::default()).unwrap_err();
        assert!(matches!(err, ApiError::NotConfigured));
    }

    #[test]
    fn test_login_response_maps_to_session() {
        let json = r#"{"id": 7, "nome": "Maria Souza", "login": "maria", "perfil": "entregador", "token": "jwt-abc"}"#;
        let parsed: LoginResponse = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.id, 7);
        assert_eq!(parsed.nome, "Maria Souza");
        assert_eq!(parsed.perfil, "entregador");
        assert_eq!(parsed.token, "jwt-abc");
    }

    #[test]
    fn test_confirm_body_without_cascos_omits_key() {
        let body = confirm_body(42, None);
        assert_eq!(body, serde_json::json!({ "pedido_id": 42 }));
    }

    #[test]
    fn test_confirm_body_with_cascos() {
        let mut payload = ReturnPayload::new();
        payload.insert(
            "12".to_string(),
            vec![ContainerReturn {
                container_id: 31,
                quantity: 2,
            }],
        );
        let body = confirm_body(42, Some(&payload));
        assert_eq!(
            body,
            serde_json::json!({
                "pedido_id": 42,
                "cascos": { "12": [{ "casco_id": 31, "quantidade": 2 }] }
            })
        );
    }

    #[test]
    fn test_contact_channel_wire_names() {
        assert_eq!(
            serde_json::to_value(ContactChannel::Telefone).unwrap(),
            serde_json::json!("telefone")
        );
        assert_eq!(
            serde_json::to_value(ContactChannel::Whatsapp).unwrap(),
            serde_json::json!("whatsapp")
        );
    }
}
