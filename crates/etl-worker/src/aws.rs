//! AWS client construction shared by the S3 and SQS adapters

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;

use crate::config::AwsConfig;

/// Build the shared SDK configuration with static credentials and an
/// optional custom endpoint (LocalStack).
pub async fn load_sdk_config(config: &AwsConfig) -> SdkConfig {
    let credentials = Credentials::new(
        &config.access_key,
        &config.secret_key,
        None,
        None,
        "etl-worker",
    );

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials);

    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}

pub fn s3_client(sdk: &SdkConfig, config: &AwsConfig) -> aws_sdk_s3::Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk)
        .force_path_style(config.path_style)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

pub fn sqs_client(sdk: &SdkConfig) -> aws_sdk_sqs::Client {
    aws_sdk_sqs::Client::new(sdk)
}
