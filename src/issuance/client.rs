//! Certificate signing request API boundary.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition, CertificateSigningRequestSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

use crate::errors::{Error, Result};

/// Signer that issues client authentication certificates
pub const CLIENT_SIGNER_NAME: &str = "kubernetes.io/kube-apiserver-client";
/// Annotation carrying the opaque login id
pub const USER_ID_ANNOTATION: &str = "krateo.user.id";

const APPROVAL_REASON: &str = "CertificateApproved";
const APPROVAL_MESSAGE: &str = "Certificate was approved by authn-service";

/// One certificate signing request to submit
#[derive(Debug, Clone)]
pub struct CsrSubmission {
    pub name: String,
    pub request_pem: Vec<u8>,
    pub user_id: String,
    pub expiration_seconds: i32,
}

/// Result of a create call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// State of a submitted request as seen by the poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrState {
    /// Not yet signed
    Pending,
    /// Signed certificate PEM
    Issued(Vec<u8>),
    /// Denied or failed, with the condition message
    Rejected(String),
}

#[async_trait]
pub trait CsrClient: Send + Sync {
    /// Submit a request; a name collision is reported, not raised
    async fn create(&self, submission: &CsrSubmission) -> Result<CreateOutcome>;

    /// Delete a request; deleting a missing request succeeds
    async fn delete(&self, name: &str) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Record an `Approved` condition on the request
    async fn approve(&self, name: &str) -> Result<()>;

    async fn state(&self, name: &str) -> Result<CsrState>;
}

/// Build the cluster object for a submission
pub fn csr_object(submission: &CsrSubmission) -> CertificateSigningRequest {
    CertificateSigningRequest {
        metadata: ObjectMeta {
            name: Some(submission.name.clone()),
            annotations: Some(BTreeMap::from([(
                USER_ID_ANNOTATION.to_string(),
                submission.user_id.clone(),
            )])),
            ..Default::default()
        },
        spec: CertificateSigningRequestSpec {
            request: ByteString(submission.request_pem.clone()),
            signer_name: CLIENT_SIGNER_NAME.to_string(),
            usages: Some(vec!["client auth".to_string()]),
            expiration_seconds: Some(submission.expiration_seconds),
            ..Default::default()
        },
        status: None,
    }
}

/// Approval condition appended to the request status
pub fn approval_condition() -> CertificateSigningRequestCondition {
    CertificateSigningRequestCondition {
        type_: "Approved".to_string(),
        status: "True".to_string(),
        reason: Some(APPROVAL_REASON.to_string()),
        message: Some(APPROVAL_MESSAGE.to_string()),
        last_update_time: Some(Time(Utc::now())),
        ..Default::default()
    }
}

/// Interpret a request's status
pub fn csr_state(csr: &CertificateSigningRequest) -> CsrState {
    let Some(status) = csr.status.as_ref() else {
        return CsrState::Pending;
    };

    if let Some(rejected) = status
        .conditions
        .iter()
        .flatten()
        .find(|c| (c.type_ == "Denied" || c.type_ == "Failed") && c.status == "True")
    {
        return CsrState::Rejected(format!(
            "{}: {}",
            rejected.type_,
            rejected.message.as_deref().unwrap_or("no message")
        ));
    }

    match status.certificate.as_ref() {
        Some(cert) if !cert.0.is_empty() => CsrState::Issued(cert.0.clone()),
        _ => CsrState::Pending,
    }
}

/// CSR access through the cluster API
#[derive(Clone)]
pub struct KubeCsrClient {
    api: Api<CertificateSigningRequest>,
}

impl KubeCsrClient {
    pub fn new(client: Client) -> Self {
        Self { api: Api::all(client) }
    }
}

#[async_trait]
impl CsrClient for KubeCsrClient {
    async fn create(&self, submission: &CsrSubmission) -> Result<CreateOutcome> {
        match self.api.create(&PostParams::default(), &csr_object(submission)).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(Error::issuance_with_source(
                format!("unable to create certificate signing request '{}'", submission.name),
                Box::new(e),
            )),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(Error::issuance_with_source(
                format!("unable to delete certificate signing request '{}'", name),
                Box::new(e),
            )),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.api.get_opt(name).await?.is_some())
    }

    async fn approve(&self, name: &str) -> Result<()> {
        let mut csr = self.api.get(name).await?;
        csr.status.get_or_insert_with(Default::default).conditions.get_or_insert_with(Vec::new).push(approval_condition());

        let body = serde_json::to_vec(&csr)?;
        self.api.replace_subresource("approval", name, &PostParams::default(), body).await.map_err(|e| {
            Error::issuance_with_source(format!("unable to approve certificate signing request '{}'", name), Box::new(e))
        })?;

        debug!(csr = %name, "Certificate signing request approved");
        Ok(())
    }

    async fn state(&self, name: &str) -> Result<CsrState> {
        let csr = self.api.get(name).await.map_err(|e| {
            Error::issuance_with_source(format!("unable to read certificate signing request '{}'", name), Box::new(e))
        })?;
        Ok(csr_state(&csr))
    }
}
