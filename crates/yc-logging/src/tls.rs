// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

use reqwest::ClientBuilder;
use std::path::Path;
use tracing::debug;

use crate::errors::InitError;

/// Creates a reqwest client builder with TLS configuration.
/// When `ca_file` is given, the PEM certificate it holds is trusted in addition
/// to the built-in root store.
pub fn create_reqwest_client_builder(ca_file: Option<&Path>) -> Result<ClientBuilder, InitError> {
    let builder = reqwest::Client::builder();
    let Some(ca_file) = ca_file else {
        return Ok(builder);
    };

    debug!("Adding root certificate from {}", ca_file.display());
    let pem = std::fs::read(ca_file).map_err(|e| {
        InitError::Tls(format!(
            "failed to get ca_file = {} details: {e}",
            ca_file.display()
        ))
    })?;
    let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
        InitError::Tls(format!(
            "failed to parse ca_file = {} details: {e}",
            ca_file.display()
        ))
    })?;

    Ok(builder.add_root_certificate(certificate))
}
