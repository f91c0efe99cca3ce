//! Shared fakes for the gateway tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use authn::config::KubeconfigConfig;
use authn::errors::{Error, Result};
use authn::issuance::{CreateOutcome, CsrClient, CsrState, CsrSubmission, IssuanceEngine};
use authn::kubeconfig::{KubeconfigGenerator, MemoryAuthInfoStore, StaticCaSource};
use authn::strategies::ldap::DirectorySettings;
use authn::strategies::{Directory, DirectoryEntry, DirectorySession};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, IsCa, KeyPair,
};

pub const SERVER_URL: &str = "https://kube.test:6443";
pub const SERVICE_DN: &str = "cn=admin,dc=example,dc=com";

#[derive(Clone, Copy, PartialEq, Eq)]
enum SignerMode {
    Sign,
    Deny,
    /// Never signs and never denies
    Ignore,
}

struct StoredCsr {
    request_pem: Vec<u8>,
    user_id: String,
    certificate: Option<Vec<u8>>,
}

/// CSR API that signs approved requests with a throwaway CA.
///
/// Like the real API, requests are left in place after they are signed.
pub struct FakeCsrSigner {
    ca_key: KeyPair,
    ca_cert: Certificate,
    requests: Mutex<HashMap<String, StoredCsr>>,
    creates: AtomicUsize,
    deletes: AtomicUsize,
    mode: SignerMode,
}

impl FakeCsrSigner {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, "kubernetes-test-ca");
        let ca_cert = params.self_signed(&ca_key).unwrap();

        Self {
            ca_key,
            ca_cert,
            requests: Mutex::new(HashMap::new()),
            creates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            mode: SignerMode::Sign,
        }
    }

    /// Signer whose requests always end up denied
    pub fn denying() -> Self {
        Self { mode: SignerMode::Deny, ..Self::new() }
    }

    /// Signer that leaves every request pending
    pub fn unresponsive() -> Self {
        Self { mode: SignerMode::Ignore, ..Self::new() }
    }

    pub fn ca_pem(&self) -> String {
        self.ca_cert.pem()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn user_id(&self, name: &str) -> Option<String> {
        self.requests.lock().unwrap().get(name).map(|r| r.user_id.clone())
    }

    fn sign(&self, request_pem: &[u8]) -> Result<Vec<u8>> {
        let pem = std::str::from_utf8(request_pem).map_err(|e| Error::issuance(e.to_string()))?;
        let params = CertificateSigningRequestParams::from_pem(pem)
            .map_err(|e| Error::issuance(format!("unparseable request: {}", e)))?;
        let certificate = params
            .signed_by(&self.ca_cert, &self.ca_key)
            .map_err(|e| Error::issuance(format!("signing failed: {}", e)))?;
        Ok(certificate.pem().into_bytes())
    }
}

#[async_trait]
impl CsrClient for FakeCsrSigner {
    async fn create(&self, submission: &CsrSubmission) -> Result<CreateOutcome> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut requests = self.requests.lock().unwrap();
        if requests.contains_key(&submission.name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        requests.insert(
            submission.name.clone(),
            StoredCsr {
                request_pem: submission.request_pem.clone(),
                user_id: submission.user_id.clone(),
                certificate: None,
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().remove(name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.requests.lock().unwrap().contains_key(name))
    }

    async fn approve(&self, name: &str) -> Result<()> {
        let request_pem = self
            .requests
            .lock()
            .unwrap()
            .get(name)
            .map(|r| r.request_pem.clone())
            .ok_or_else(|| Error::issuance(format!("no request named {}", name)))?;

        if self.mode != SignerMode::Sign {
            return Ok(());
        }

        let certificate = self.sign(&request_pem)?;
        if let Some(stored) = self.requests.lock().unwrap().get_mut(name) {
            stored.certificate = Some(certificate);
        }
        Ok(())
    }

    async fn state(&self, name: &str) -> Result<CsrState> {
        if self.mode == SignerMode::Deny {
            return Ok(CsrState::Rejected("Denied: test policy".to_string()));
        }
        let requests = self.requests.lock().unwrap();
        let stored = requests.get(name).ok_or_else(|| Error::issuance(format!("no request named {}", name)))?;
        Ok(match &stored.certificate {
            Some(cert) => CsrState::Issued(cert.clone()),
            None => CsrState::Pending,
        })
    }
}

pub fn engine(signer: Arc<FakeCsrSigner>) -> IssuanceEngine {
    IssuanceEngine::new(signer).with_timing(Duration::from_millis(10), Duration::from_secs(5))
}

pub fn generator(signer: Arc<FakeCsrSigner>, store: Arc<MemoryAuthInfoStore>) -> KubeconfigGenerator {
    let config = KubeconfigConfig {
        server_url: Some(SERVER_URL.to_string()),
        cluster_name: "krateo".to_string(),
        ..Default::default()
    };
    let ca = Arc::new(StaticCaSource(signer.ca_pem().into_bytes()));
    KubeconfigGenerator::new(engine(signer), store, ca, &config)
}

/// Directory holding fixed search results.
///
/// The service account binds with any password; users bind with `user_password`.
pub struct FakeDirectory {
    pub entries: Vec<DirectoryEntry>,
    pub user_password: String,
    pub binds: Arc<Mutex<Vec<String>>>,
}

impl FakeDirectory {
    pub fn new(entries: Vec<DirectoryEntry>, user_password: &str) -> Self {
        Self { entries, user_password: user_password.to_string(), binds: Arc::default() }
    }

    pub fn binds(&self) -> Vec<String> {
        self.binds.lock().unwrap().clone()
    }
}

struct FakeSession {
    entries: Vec<DirectoryEntry>,
    user_password: String,
    binds: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn connect(&self, _settings: &DirectorySettings) -> Result<Box<dyn DirectorySession>> {
        Ok(Box::new(FakeSession {
            entries: self.entries.clone(),
            user_password: self.user_password.clone(),
            binds: self.binds.clone(),
        }))
    }
}

#[async_trait]
impl DirectorySession for FakeSession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.binds.lock().unwrap().push(dn.to_string());
        if dn == SERVICE_DN || password == self.user_password {
            Ok(())
        } else {
            Err(Error::credential_mismatch("Invalid Credentials"))
        }
    }

    async fn search(&mut self, _base_dn: &str, _filter: &str, _attrs: &[&str]) -> Result<Vec<DirectoryEntry>> {
        Ok(self.entries.clone())
    }

    async fn close(&mut self) {}
}

pub fn ldap_entry(uid: &str, cn: &str, ous: &[&str]) -> DirectoryEntry {
    DirectoryEntry {
        dn: format!("uid={},dc=example,dc=com", uid),
        attrs: HashMap::from([
            ("uid".to_string(), vec![uid.to_string()]),
            ("cn".to_string(), vec![cn.to_string()]),
            ("mail".to_string(), vec![format!("{}@example.com", uid)]),
            ("ou".to_string(), ous.iter().map(|s| s.to_string()).collect()),
        ]),
    }
}

/// Unsigned JWT carrying `claims`
pub fn unsigned_jwt(claims: serde_json::Value) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}
