//! REST client for a json-server style resource server
//!
//! Cars live under `/garage`, winners under `/winners` and the engine is
//! driven through `PATCH /engine?id=&status=`. List totals come from the
//! `X-Total-Count` header; a missing or unparsable header counts as zero.

use async_trait::async_trait;
use derby_core::backend::{BackendError, RaceBackend};
use derby_core::config::DerbyConfig;
use derby_core::model::*;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

pub const TOTAL_COUNT_HEADER: &str = "X-Total-Count";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpBackend {
    base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(base_url, client)
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn from_config(config: &DerbyConfig) -> Self {
        Self::new(config.api_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn list<T, K>(&self, resource: &str, query: &PageQuery<K>) -> Result<Page<T>, BackendError>
    where
        T: DeserializeOwned,
        K: SortColumn,
    {
        let request = self.client.get(self.url(resource)).query(&query.to_params());
        let response = send(request).await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let total = total_count(&response);
        let items = decode(response).await?;
        Ok(Page { items, total })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        path: &str,
        id: CarId,
    ) -> Result<Option<T>, BackendError> {
        let response = send(self.client.get(self.url(&format!("{}/{}", path, id)))).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => decode(response).await.map(Some),
            _ => Err(item_error(response, resource, id).await),
        }
    }

    async fn engine<T: DeserializeOwned>(
        &self,
        id: CarId,
        command: EngineStatus,
    ) -> Result<T, BackendError> {
        debug!("PATCH engine {} {}", id, command.as_str());
        let request = self
            .client
            .patch(self.url("engine"))
            .query(&[("id", id.to_string()), ("status", command.as_str().to_string())]);
        let response = send(request).await?;

        match response.status() {
            status if status.is_success() => decode(response).await,
            StatusCode::TOO_MANY_REQUESTS => Err(BackendError::TooManyRequests(id)),
            StatusCode::INTERNAL_SERVER_ERROR if command == EngineStatus::Drive => {
                Err(BackendError::EngineBroken(id))
            }
            _ => Err(item_error(response, "engine", id).await),
        }
    }
}

async fn send(request: RequestBuilder) -> Result<Response, BackendError> {
    request
        .send()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response
        .json()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))
}

fn total_count(response: &Response) -> usize {
    response
        .headers()
        .get(TOTAL_COUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Error for a request on a collection
async fn status_error(response: Response) -> BackendError {
    let status = response.status();
    let message = response.text().await.unwrap_or_default();
    match status {
        StatusCode::BAD_REQUEST => BackendError::Invalid(message),
        StatusCode::CONFLICT => BackendError::Conflict(message),
        _ => BackendError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// Error for a request on a single item
async fn item_error(response: Response, resource: &'static str, id: CarId) -> BackendError {
    match response.status() {
        StatusCode::NOT_FOUND => BackendError::NotFound { resource, id },
        _ => status_error(response).await,
    }
}

/// Fail with the item error unless the response is a success
async fn expect_item<T: DeserializeOwned>(
    response: Response,
    resource: &'static str,
    id: CarId,
) -> Result<T, BackendError> {
    if response.status().is_success() {
        decode(response).await
    } else {
        Err(item_error(response, resource, id).await)
    }
}

#[async_trait]
impl RaceBackend for HttpBackend {
    async fn list_cars(&self, query: &PageQuery<CarSortBy>) -> Result<Page<Car>, BackendError> {
        self.list("garage", query).await
    }

    async fn get_car(&self, id: CarId) -> Result<Option<Car>, BackendError> {
        self.get("car", "garage", id).await
    }

    async fn create_car(&self, car: &NewCar) -> Result<Car, BackendError> {
        let response = send(self.client.post(self.url("garage")).json(car)).await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        decode(response).await
    }

    async fn update_car(&self, id: CarId, car: &NewCar) -> Result<Car, BackendError> {
        let url = self.url(&format!("garage/{}", id));
        let response = send(self.client.put(url).json(car)).await?;
        expect_item(response, "car", id).await
    }

    async fn delete_car(&self, id: CarId) -> Result<(), BackendError> {
        let response = send(self.client.delete(self.url(&format!("garage/{}", id)))).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(item_error(response, "car", id).await)
        }
    }

    async fn start_engine(&self, id: CarId) -> Result<EngineResponse, BackendError> {
        self.engine(id, EngineStatus::Started).await
    }

    async fn stop_engine(&self, id: CarId) -> Result<EngineResponse, BackendError> {
        self.engine(id, EngineStatus::Stopped).await
    }

    async fn drive(&self, id: CarId) -> Result<DriveResponse, BackendError> {
        self.engine(id, EngineStatus::Drive).await
    }

    async fn list_winners(
        &self,
        query: &PageQuery<WinnersSortBy>,
    ) -> Result<Page<Winner>, BackendError> {
        self.list("winners", query).await
    }

    async fn get_winner(&self, id: CarId) -> Result<Option<Winner>, BackendError> {
        self.get("winner", "winners", id).await
    }

    async fn create_winner(&self, winner: &Winner) -> Result<Winner, BackendError> {
        let response = send(self.client.post(self.url("winners")).json(winner)).await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        decode(response).await
    }

    async fn update_winner(
        &self,
        id: CarId,
        update: &WinnerUpdate,
    ) -> Result<Winner, BackendError> {
        let url = self.url(&format!("winners/{}", id));
        let response = send(self.client.put(url).json(update)).await?;
        expect_item(response, "winner", id).await
    }

    async fn delete_winner(&self, id: CarId) -> Result<(), BackendError> {
        let response = send(self.client.delete(self.url(&format!("winners/{}", id)))).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(item_error(response, "winner", id).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_dropped() {
        let backend = HttpBackend::new("http://localhost:3000/");
        assert_eq!(backend.base_url(), "http://localhost:3000");
        assert_eq!(backend.url("garage"), "http://localhost:3000/garage");
    }

    #[test]
    fn config_url_is_used() {
        let backend = HttpBackend::from_config(&DerbyConfig::default());
        assert_eq!(backend.url("winners/3"), "http://localhost:3000/winners/3");
    }
}
