//! # Certificate Issuance
//!
//! Mints a client certificate for a user through the cluster's certificate
//! signing API:
//!
//! ```text
//! generate key → build request → submit ─┬─ created ──────────────┐
//!                                        └─ exists → delete, wait ┤ (retry once)
//!                                                                 ↓
//!                          encode ← retrieve ← poll for signature ← approve
//! ```
//!
//! Every issuance for the same request name runs under a per-name lock, and
//! the whole sequence runs on its own task so a dropped HTTP request does not
//! abandon a half-approved CSR.

pub mod client;
pub mod csr;
pub mod lock;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, info, warn, Instrument};

use crate::errors::{Error, Result};
use crate::identity::{dns1123, UserInfo};
use crate::observability::MetricsRecorder;

pub use client::{CreateOutcome, CsrClient, CsrState, CsrSubmission, KubeCsrClient};
pub use csr::KeyMaterial;
pub use lock::IssuanceLocks;

/// Interval between status reads
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Upper bound for both the delete and the signature waits
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Signed certificate and its private key
#[derive(Clone)]
pub struct IssuedCredential {
    pub certificate_pem: Vec<u8>,
    pub private_key_pem: String,
}

impl IssuedCredential {
    /// Base64 of the certificate PEM, as embedded in kubeconfigs
    pub fn certificate_data(&self) -> String {
        STANDARD.encode(&self.certificate_pem)
    }

    /// Base64 of the private key PEM
    pub fn key_data(&self) -> String {
        STANDARD.encode(self.private_key_pem.as_bytes())
    }
}

impl std::fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("certificate_bytes", &self.certificate_pem.len())
            .finish_non_exhaustive()
    }
}

/// Drives CSRs from submission to signed certificate
#[derive(Clone)]
pub struct IssuanceEngine {
    client: Arc<dyn CsrClient>,
    locks: IssuanceLocks,
    poll_interval: Duration,
    timeout: Duration,
    metrics: MetricsRecorder,
}

impl IssuanceEngine {
    pub fn new(client: Arc<dyn CsrClient>) -> Self {
        Self {
            client,
            locks: IssuanceLocks::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Override the poll cadence; tests use millisecond values
    pub fn with_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    /// Issue a client certificate valid for `validity`
    pub async fn issue(&self, user: &UserInfo, validity: Duration) -> Result<IssuedCredential> {
        let engine = self.clone();
        let user = user.clone();
        let span = crate::issuance_span!(dns1123(&user.username));

        tokio::spawn(async move { engine.run(&user, validity).await }.instrument(span))
            .await
            .map_err(|e| Error::issuance(format!("issuance task aborted: {}", e)))?
    }

    async fn run(&self, user: &UserInfo, validity: Duration) -> Result<IssuedCredential> {
        let name = dns1123(&user.username);
        if name.is_empty() {
            return Err(Error::issuance(format!(
                "username '{}' cannot be used as a resource name",
                user.username
            )));
        }
        let expiration_seconds = i32::try_from(validity.as_secs())
            .map_err(|_| Error::issuance("certificate duration out of range"))?;

        let _guard = self.locks.acquire(&name).await;
        let started = Instant::now();

        let common_name = user.username.clone();
        let groups = user.groups.clone();
        let material = tokio::task::spawn_blocking(move || csr::generate(&common_name, &groups))
            .await
            .map_err(|e| Error::issuance(format!("key generation task failed: {}", e)))??;

        let submission = CsrSubmission {
            name: name.clone(),
            request_pem: material.request_pem.into_bytes(),
            user_id: user.id.clone(),
            expiration_seconds,
        };

        self.submit(&submission).await?;
        self.client.approve(&name).await?;

        let certificate_pem = self.await_certificate(&name).await?;
        log_certificate(&name, &certificate_pem);

        self.metrics.record_csr_issued(started.elapsed());
        info!(csr = %name, groups = ?user.groups, "Client certificate issued");

        Ok(IssuedCredential { certificate_pem, private_key_pem: material.private_key_pem })
    }

    async fn submit(&self, submission: &CsrSubmission) -> Result<()> {
        if self.client.create(submission).await? == CreateOutcome::Created {
            return Ok(());
        }

        warn!(csr = %submission.name, "Stale certificate signing request found, replacing it");
        self.client.delete(&submission.name).await?;

        let client = self.client.clone();
        let name = submission.name.clone();
        poll_until(self.timeout, self.poll_interval, "deletion of stale certificate signing request", || {
            let client = client.clone();
            let name = name.clone();
            async move { Ok((!client.exists(&name).await?).then_some(())) }
        })
        .await?;

        match self.client.create(submission).await? {
            CreateOutcome::Created => Ok(()),
            CreateOutcome::AlreadyExists => Err(Error::issuance(format!(
                "certificate signing request '{}' already exists",
                submission.name
            ))),
        }
    }

    async fn await_certificate(&self, name: &str) -> Result<Vec<u8>> {
        let client = self.client.clone();
        let name = name.to_string();
        poll_until(self.timeout, self.poll_interval, "signed certificate", || {
            let client = client.clone();
            let name = name.clone();
            async move {
                match client.state(&name).await? {
                    CsrState::Issued(cert) => Ok(Some(cert)),
                    CsrState::Pending => Ok(None),
                    CsrState::Rejected(reason) => Err(Error::issuance(format!(
                        "certificate signing request '{}' was not approved: {}",
                        name, reason
                    ))),
                }
            }
        })
        .await
    }
}

/// Poll `check` until it yields a value. Errors end the wait immediately.
pub async fn poll_until<T, F, Fut>(
    timeout: Duration,
    poll_interval: Duration,
    waiting_for: &str,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        if start.elapsed() >= timeout {
            return Err(Error::issuance(format!(
                "timed out after {:?} waiting for {}",
                timeout, waiting_for
            )));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

fn log_certificate(name: &str, pem: &[u8]) {
    match x509_parser::pem::parse_x509_pem(pem) {
        Ok((_, block)) => match block.parse_x509() {
            Ok(cert) => debug!(
                csr = %name,
                subject = %cert.subject(),
                not_after = %cert.validity().not_after,
                "Signed certificate received"
            ),
            Err(e) => warn!(csr = %name, error = %e, "Signed certificate is not valid X.509"),
        },
        Err(e) => warn!(csr = %name, error = %e, "Signed certificate is not PEM"),
    }
}
