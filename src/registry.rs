//! Name registration store
//!
//! Keeps local name resolution in sync with the proxy's domain: every
//! routable subdomain gets a loopback record so it resolves to this machine.
//! The [`HostRegistry`] trait is the seam between the dispatcher and the
//! backing store; [`HostsFileRegistry`] persists to an `/etc/hosts`-style
//! file, [`MemoryRegistry`] keeps records in memory.

use crate::hosts::{HostsError, HostsFile};
use parking_lot::Mutex;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Address every registered hostname resolves to.
pub const LOOPBACK: &str = "127.0.0.1";

/// Error type for registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The hostname is outside the registered top-level domain
    #[error("host {host} is outside registered domain {tld}")]
    DomainMismatch { host: String, tld: String },
    /// The backing store could not be loaded or persisted
    #[error("name registration store unavailable: {0}")]
    Unavailable(#[from] HostsError),
}

/// Capability interface over a name registration backend.
///
/// Implementations serialize their own mutations; callers may share one
/// instance across request handlers.
pub trait HostRegistry: Send + Sync {
    /// The top-level domain this registry owns.
    fn tld(&self) -> &str;

    /// Register `host`, which must end with the TLD. Idempotent.
    fn add_host(&self, host: &str) -> Result<(), RegistryError>;

    /// Unregister `host`, which must end with the TLD. Removing an absent
    /// host is a no-op.
    fn remove_host(&self, host: &str) -> Result<(), RegistryError>;

    /// Distinct registered hostnames under the TLD, order insignificant.
    fn list_subdomains(&self) -> Vec<String>;

    /// Remove the TLD record and every record under it. Shutdown teardown.
    fn remove_tld(&self) -> Result<(), RegistryError>;

    /// Register `label` as a subdomain of the TLD.
    fn add_subdomain(&self, label: &str) -> Result<(), RegistryError> {
        self.add_host(&qualify(label, self.tld()))
    }

    /// Unregister `label` as a subdomain of the TLD.
    fn remove_subdomain(&self, label: &str) -> Result<(), RegistryError> {
        self.remove_host(&qualify(label, self.tld()))
    }
}

/// Qualify a bare label against the TLD. A trailing separator on the label
/// is not doubled: `"app"` and `"app."` both become `"app.<tld>"`.
fn qualify(label: &str, tld: &str) -> String {
    let label = label.trim().to_ascii_lowercase();
    if label.ends_with('.') {
        format!("{}{}", label, tld)
    } else {
        format!("{}.{}", label, tld)
    }
}

fn check_domain(host: &str, tld: &str) -> Result<String, RegistryError> {
    let host = host.trim().to_ascii_lowercase();
    if host.ends_with(tld) {
        Ok(host)
    } else {
        Err(RegistryError::DomainMismatch {
            host,
            tld: tld.to_string(),
        })
    }
}

/// Hosts-file backed registry.
///
/// The backing file has no concurrency control of its own, so all mutation
/// is funneled through one mutex for the duration of reload, mutate, flush.
/// The reload step merges edits made to the file outside this process;
/// without it, an unrelated external edit would be reverted by the next
/// flush.
pub struct HostsFileRegistry {
    tld: String,
    file: Mutex<HostsFile>,
}

impl HostsFileRegistry {
    /// Open the backing file, ensure the TLD's own record exists, remove
    /// duplicate records, and persist. Failure here is fatal at startup.
    pub fn open(tld: &str, path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let tld = tld.trim().to_ascii_lowercase();
        let mut file = HostsFile::open(path)?;

        if !file.has_hostname(&tld) {
            file.add(LOOPBACK, &tld);
        }
        file.remove_duplicates();
        file.flush()?;

        info!(tld = %tld, path = %file.path().display(), "Name registration store opened");
        Ok(Self {
            tld,
            file: Mutex::new(file),
        })
    }
}

impl HostRegistry for HostsFileRegistry {
    fn tld(&self) -> &str {
        &self.tld
    }

    fn add_host(&self, host: &str) -> Result<(), RegistryError> {
        let host = check_domain(host, &self.tld)?;
        let mut file = self.file.lock();
        file.load()?;
        file.add(LOOPBACK, &host);
        file.flush()?;
        debug!(host = %host, "Host registered");
        Ok(())
    }

    fn remove_host(&self, host: &str) -> Result<(), RegistryError> {
        let host = check_domain(host, &self.tld)?;
        let mut file = self.file.lock();
        file.load()?;
        file.remove(LOOPBACK, &host);
        file.flush()?;
        debug!(host = %host, "Host unregistered");
        Ok(())
    }

    fn list_subdomains(&self) -> Vec<String> {
        let file = self.file.lock();
        let mut hosts: Vec<String> = file
            .hostnames()
            .into_iter()
            .filter(|h| h.to_ascii_lowercase().ends_with(&self.tld))
            .map(|h| h.to_ascii_lowercase())
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    fn remove_tld(&self) -> Result<(), RegistryError> {
        let mut file = self.file.lock();
        file.load()?;
        file.remove(LOOPBACK, &self.tld);
        for host in file.hostnames() {
            if host.to_ascii_lowercase().ends_with(&self.tld) {
                file.remove(LOOPBACK, &host);
            }
        }
        file.flush()?;
        info!(tld = %self.tld, "Domain unregistered");
        Ok(())
    }
}

/// In-memory registry, for tests and deployments where the hosts file is
/// managed elsewhere.
pub struct MemoryRegistry {
    tld: String,
    hosts: Mutex<Vec<String>>,
}

impl MemoryRegistry {
    pub fn new(tld: &str) -> Self {
        let tld = tld.trim().to_ascii_lowercase();
        Self {
            hosts: Mutex::new(vec![tld.clone()]),
            tld,
        }
    }
}

impl HostRegistry for MemoryRegistry {
    fn tld(&self) -> &str {
        &self.tld
    }

    fn add_host(&self, host: &str) -> Result<(), RegistryError> {
        let host = check_domain(host, &self.tld)?;
        let mut hosts = self.hosts.lock();
        if !hosts.contains(&host) {
            hosts.push(host);
        }
        Ok(())
    }

    fn remove_host(&self, host: &str) -> Result<(), RegistryError> {
        let host = check_domain(host, &self.tld)?;
        self.hosts.lock().retain(|h| h != &host);
        Ok(())
    }

    fn list_subdomains(&self) -> Vec<String> {
        self.hosts.lock().clone()
    }

    fn remove_tld(&self) -> Result<(), RegistryError> {
        self.hosts.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TLD: &str = "example.com";

    fn file_registry() -> (NamedTempFile, HostsFileRegistry) {
        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(b"127.0.0.1 localhost\n").expect("seed file");
        let registry = HostsFileRegistry::open(TLD, file.path()).expect("open registry");
        (file, registry)
    }

    #[test]
    fn test_open_ensures_tld_record() {
        let (file, registry) = file_registry();
        assert_eq!(registry.tld(), TLD);
        assert!(registry.list_subdomains().contains(&TLD.to_string()));

        let contents = std::fs::read_to_string(file.path()).expect("read back");
        assert!(contents.contains("127.0.0.1 example.com"));
        assert!(contents.contains("127.0.0.1 localhost"));
    }

    #[test]
    fn test_add_then_list_then_remove() {
        let (_file, registry) = file_registry();
        let host = "app.example.com".to_string();

        registry.add_host(&host).expect("add host");
        assert!(registry.list_subdomains().contains(&host));

        registry.remove_host(&host).expect("remove host");
        assert!(!registry.list_subdomains().contains(&host));
    }

    #[test]
    fn test_add_is_idempotent() {
        let (_file, registry) = file_registry();
        let host = "app.example.com".to_string();

        registry.add_host(&host).expect("add host");
        registry.add_host(&host).expect("re-add host");

        let count = registry
            .list_subdomains()
            .iter()
            .filter(|h| *h == &host)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_remove_absent_host_is_noop() {
        let (_file, registry) = file_registry();
        registry
            .remove_host("ghost.example.com")
            .expect("remove absent host");
    }

    #[test]
    fn test_domain_mismatch_leaves_store_unmodified() {
        let (_file, registry) = file_registry();
        let before = registry.list_subdomains();

        let err = registry.add_host("app.other.org").unwrap_err();
        assert!(matches!(err, RegistryError::DomainMismatch { .. }));
        assert!(registry.remove_host("app.other.org").is_err());

        assert_eq!(registry.list_subdomains(), before);
    }

    #[test]
    fn test_add_subdomain_qualifies_label() {
        let (_file, registry) = file_registry();

        registry.add_subdomain("app").expect("add subdomain");
        assert!(registry
            .list_subdomains()
            .contains(&"app.example.com".to_string()));

        // Trailing separator is not doubled
        registry.add_subdomain("other.").expect("add subdomain");
        assert!(registry
            .list_subdomains()
            .contains(&"other.example.com".to_string()));

        registry.remove_subdomain("app").expect("remove subdomain");
        assert!(!registry
            .list_subdomains()
            .contains(&"app.example.com".to_string()));
    }

    #[test]
    fn test_remove_tld_clears_every_record_under_it() {
        let (file, registry) = file_registry();
        registry.add_subdomain("app").expect("add subdomain");
        registry.add_subdomain("api").expect("add subdomain");

        registry.remove_tld().expect("remove tld");
        assert!(registry.list_subdomains().is_empty());

        // Unrelated entries survive
        let contents = std::fs::read_to_string(file.path()).expect("read back");
        assert!(contents.contains("localhost"));
        assert!(!contents.contains("example.com"));
    }

    #[test]
    fn test_open_deduplicates_existing_records() {
        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(b"127.0.0.1 app.example.com\n127.0.0.1 app.example.com\n")
            .expect("seed file");
        let registry = HostsFileRegistry::open(TLD, file.path()).expect("open registry");

        let count = registry
            .list_subdomains()
            .iter()
            .filter(|h| h.as_str() == "app.example.com")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reload_merges_external_edits() {
        let (file, registry) = file_registry();

        // Simulate an edit made outside the process
        let mut contents = std::fs::read_to_string(file.path()).expect("read");
        contents.push_str("10.0.0.5 external.host\n");
        std::fs::write(file.path(), &contents).expect("external edit");

        registry.add_subdomain("app").expect("add subdomain");

        let written = std::fs::read_to_string(file.path()).expect("read back");
        assert!(written.contains("10.0.0.5 external.host"));
        assert!(written.contains("app.example.com"));
    }

    #[test]
    fn test_memory_registry_matches_contract() {
        let registry = MemoryRegistry::new(TLD);
        assert_eq!(registry.tld(), TLD);
        assert!(registry.list_subdomains().contains(&TLD.to_string()));

        registry.add_subdomain("app").expect("add subdomain");
        assert!(registry
            .list_subdomains()
            .contains(&"app.example.com".to_string()));

        assert!(matches!(
            registry.add_host("app.other.org"),
            Err(RegistryError::DomainMismatch { .. })
        ));

        registry.remove_tld().expect("remove tld");
        assert!(registry.list_subdomains().is_empty());
    }
}
