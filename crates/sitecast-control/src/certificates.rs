//! Certificate-type dispatch for the SSL stage.

use tracing::info;

use crate::collaborators::{CertificateResult, CertificateService};
use crate::error::{ControlError, ControlResult};
use crate::types::{CertificateType, SslConfig};

/// Obtain a certificate for `domain` through exactly one issuance path.
pub async fn configure_ssl(
    service: &dyn CertificateService,
    ssl: &SslConfig,
    domain: &str,
) -> ControlResult<CertificateResult> {
    let result = match &ssl.certificate_type {
        CertificateType::SelfSigned => service.create_self_signed(domain).await?,
        CertificateType::LetsEncrypt => {
            service
                .request_external(domain, ssl.email.as_deref())
                .await?
        }
        CertificateType::Import => {
            let path = ssl.certificate_path.as_deref().ok_or_else(|| {
                ControlError::certificate("certificate import requires a certificate path")
            })?;
            service
                .import(path, ssl.certificate_password.as_deref())
                .await?
        }
        CertificateType::KeyVault => {
            let (Some(vault), Some(secret)) = (&ssl.vault_name, &ssl.secret_name) else {
                return Err(ControlError::certificate(
                    "key vault retrieval requires a vault and secret name",
                ));
            };
            service.fetch_from_vault(vault, secret).await?
        }
        CertificateType::Unrecognized(name) => {
            return Err(ControlError::UnsupportedCertificateType(name.clone()));
        }
    };

    if !result.success || result.thumbprint.is_empty() {
        return Err(ControlError::certificate(format!(
            "{} certificate for {domain} was not issued",
            ssl.certificate_type
        )));
    }

    info!(
        domain,
        certificate_type = %result.certificate_type,
        thumbprint = %result.thumbprint,
        expires = %result.expiry_date,
        "certificate ready"
    );
    Ok(result)
}
