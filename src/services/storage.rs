use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use std::time::Duration;

use crate::core::config::Settings;

/// Object storage for lesson recordings and uploaded transcripts. Optional:
/// without credentials the crate runs, but audio lessons cannot be
/// transcribed.
#[derive(Debug, Clone)]
pub struct StorageService {
    client: Client,
    bucket: String,
    presign_expiry: Duration,
}

impl StorageService {
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        if !settings.s3().configured() {
            return Ok(None);
        }

        let creds = Credentials::new(
            settings.s3().access_key.clone(),
            settings.s3().secret_key.clone(),
            None,
            None,
            "aulaflow-static",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(settings.s3().endpoint.clone())
            .region(aws_config::Region::new(settings.s3().region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        let client = Client::new(&config);

        Ok(Some(Self {
            client,
            bucket: settings.s3().bucket.clone(),
            presign_expiry: Duration::from_secs(settings.s3().presigned_url_expire_minutes * 60),
        }))
    }

    /// Short-lived read URL handed to the transcription engine.
    pub async fn presign_get(&self, key: &str) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(self.presign_expiry)?)
            .await?;

        Ok(presigned.uri().to_string())
    }

    /// Fetches an uploaded transcript or summary as UTF-8 text.
    pub async fn download_text(&self, key: &str) -> anyhow::Result<String> {
        let object = self.client.get_object().bucket(&self.bucket).key(key).send().await?;
        let bytes = object.body.collect().await?.into_bytes();
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}
