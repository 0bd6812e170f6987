use crate::config::GarageConfig;
use crate::error::{ImageLoadError, TransportError};
use crate::garage_api::backoff::ReconnectPolicy;
use crate::garage_api::event_stream::EventStream;
use crate::garage_api::models::control::Control;
use crate::garage_api::models::request::toggle_request::ToggleRequest;
use crate::garage_api::models::response::status_response::StatusSnapshot;
use crate::garage_api::models::response::toggle_response::{
    LockResponse, NotifyResponse, PirResponse,
};
use bytes::Bytes;
use reqwest::Response;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct GarageClient {
    client: reqwest::Client,
    /// No overall timeout: the push channel stays open indefinitely.
    stream_client: reqwest::Client,
    base_url: String,
    camera_url: String,
}

impl GarageClient {
    pub fn new(config: &GarageConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_seconds);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let stream_client = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Ok(Self::from_parts(
            client,
            stream_client,
            &config.base_url,
            &config.camera_url,
        ))
    }

    pub fn from_parts(
        client: reqwest::Client,
        stream_client: reqwest::Client,
        base_url: &str,
        camera_url: &str,
    ) -> Self {
        Self {
            client,
            stream_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            camera_url: camera_url.to_string(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn camera_url(&self) -> &str {
        &self.camera_url
    }

    pub fn open_event_stream(&self, policy: ReconnectPolicy) -> EventStream {
        EventStream::open(self.stream_client.clone(), self.url("/stream"), policy)
    }

    async fn checked(endpoint: &str, response: Response) -> Result<Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(
        endpoint: &str,
        response: Response,
    ) -> Result<T, TransportError> {
        let contents = Self::checked(endpoint, response).await?.text().await?;
        serde_json::from_str(&contents).map_err(|_| TransportError::Decode {
            endpoint: endpoint.to_string(),
            body: contents,
        })
    }
}

impl GarageApiTrait for GarageClient {
    async fn send_toggle(&self, control: Control, desired: bool) -> Result<bool, TransportError> {
        let endpoint = control.endpoint();
        info!("set {}: {}", control, desired);
        let response = self
            .client
            .post(self.url(endpoint))
            .json(&ToggleRequest::new(control, desired))
            .send()
            .await?;
        // the echoed field is authoritative, not the requested value
        match control {
            Control::Lock => Ok(Self::decode::<LockResponse>(endpoint, response).await?.locked),
            Control::MotionDetection => {
                Ok(Self::decode::<PirResponse>(endpoint, response).await?.pir_enabled)
            }
            Control::Notify => {
                Ok(Self::decode::<NotifyResponse>(endpoint, response)
                    .await?
                    .notify_enabled)
            }
        }
    }

    async fn send_door_toggle(&self) -> Result<(), TransportError> {
        let response = self.client.post(self.url("/click")).body("").send().await?;
        Self::checked("/click", response).await?;
        debug!("door toggle accepted");
        Ok(())
    }

    async fn get_status(&self) -> Result<StatusSnapshot, TransportError> {
        let response = self.client.get(self.url("/status")).send().await?;
        Self::decode("/status", response).await
    }

    async fn fetch_image(&self, uri: &str) -> Result<Bytes, ImageLoadError> {
        let response = self.client.get(uri).send().await?;
        if !response.status().is_success() {
            return Err(ImageLoadError::Status(response.status()));
        }
        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(ImageLoadError::Empty);
        }
        Ok(body)
    }
}

pub trait GarageApiTrait {
    fn send_toggle(
        &self,
        control: Control,
        desired: bool,
    ) -> impl std::future::Future<Output = Result<bool, TransportError>> + Send;
    fn send_door_toggle(
        &self,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
    fn get_status(
        &self,
    ) -> impl std::future::Future<Output = Result<StatusSnapshot, TransportError>> + Send;
    fn fetch_image(
        &self,
        uri: &str,
    ) -> impl std::future::Future<Output = Result<Bytes, ImageLoadError>> + Send;
}

// Implement GarageApiTrait for Arc<T> where T: GarageApiTrait
impl<T> GarageApiTrait for Arc<T>
where
    T: GarageApiTrait + Send + Sync,
{
    async fn send_toggle(&self, control: Control, desired: bool) -> Result<bool, TransportError> {
        self.as_ref().send_toggle(control, desired).await
    }

    async fn send_door_toggle(&self) -> Result<(), TransportError> {
        self.as_ref().send_door_toggle().await
    }

    async fn get_status(&self) -> Result<StatusSnapshot, TransportError> {
        self.as_ref().get_status().await
    }

    async fn fetch_image(&self, uri: &str) -> Result<Bytes, ImageLoadError> {
        self.as_ref().fetch_image(uri).await
    }
}
