use std::time::Duration;

use async_trait::async_trait;
use eyre::Context;
use tracing::{info, instrument, warn};
use url::Url;

use crate::{error::MinterError, request::MintMetadata};

use super::MetadataPublisher;

const PIN_JSON_PATH: &str = "pinning/pinJSONToIPFS";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings of a pinning service speaking the `pinJSONToIPFS` protocol
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinningPublisherConf {
    /// base url of the pinning api, `https://host/v1` and `https://host/v1/` are equivalent
    pub endpoint: Url,
    /// bearer token
    pub jwt: String,
    /// when set, uris point at this gateway instead of the `ipfs://` scheme
    #[serde(default)]
    pub gateway: Option<Url>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct PinRequest<'a> {
    pinata_content: &'a MintMetadata,
    pinata_metadata: PinName<'a>,
}

#[derive(serde::Serialize)]
struct PinName<'a> {
    name: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Publishes metadata by pinning it on an IPFS pinning service
pub struct PinningPublisher {
    client: reqwest::Client,
    conf: PinningPublisherConf,
}

impl PinningPublisher {
    pub fn new(conf: PinningPublisherConf) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Building pinning service http client")?;
        Ok(Self { client, conf })
    }

    fn pin_url(&self) -> Result<Url, MinterError> {
        // `Url::join` replaces the last segment of a base without a trailing slash
        let mut base = self.conf.endpoint.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(PIN_JSON_PATH)
            .map_err(|err| MinterError::PublishFailed(err.to_string()))
    }

    fn uri_for(&self, cid: &str) -> String {
        match &self.conf.gateway {
            Some(gateway) => format!("{}/ipfs/{cid}", gateway.as_str().trim_end_matches('/')),
            None => format!("ipfs://{cid}"),
        }
    }
}

#[async_trait]
impl MetadataPublisher for PinningPublisher {
    #[instrument(skip_all, name = "PinningPublisher::publish", fields(name = %metadata.name))]
    async fn publish(&self, metadata: &MintMetadata) -> Result<String, MinterError> {
        let body = PinRequest {
            pinata_content: metadata,
            pinata_metadata: PinName {
                name: &metadata.name,
            },
        };
        let response = self
            .client
            .post(self.pin_url()?)
            .bearer_auth(&self.conf.jwt)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(?status, %text, "Pinning service rejected metadata");
            return Err(MinterError::PublishFailed(format!("{status}: {text}")));
        }

        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|err| MinterError::PublishFailed(err.to_string()))?;
        let uri = self.uri_for(&pinned.ipfs_hash);
        info!(%uri, "Published metadata");
        Ok(uri)
    }
}
