use crate::errors::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// A registry participant, always held in lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        let hex = lowered
            .strip_prefix("0x")
            .ok_or_else(|| CacheError::InvalidInput(format!("address '{raw}' lacks 0x prefix")))?;
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CacheError::InvalidInput(format!(
                "address '{raw}' is not 20 bytes of hex"
            )));
        }
        Ok(Self(lowered))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl FromStr for Address {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chain name. Doubles as the cache table name, so it is restricted to a safe identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainId(String);

impl ChainId {
    pub fn parse(raw: &str) -> Result<Self> {
        let name = raw.trim().to_ascii_lowercase();
        let mut chars = name.chars();
        let valid_head = chars.next().is_some_and(|c| c.is_ascii_lowercase());
        let valid_tail = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid_head || !valid_tail || name.len() > 32 || name == "users" {
            return Err(CacheError::InvalidInput(format!("invalid chain name '{raw}'")));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChainId {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self> {
        ChainId::parse(&value)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.0
    }
}

impl FromStr for ChainId {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        ChainId::parse(s)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One persisted profile column. `ALL` is the field-to-column table every SQL
/// statement is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HoloField {
    Name,
    Bio,
    Orcid,
    Google,
    Github,
    Twitter,
    Discord,
}

impl HoloField {
    pub const ALL: [HoloField; 7] = [
        HoloField::Name,
        HoloField::Bio,
        HoloField::Orcid,
        HoloField::Google,
        HoloField::Github,
        HoloField::Twitter,
        HoloField::Discord,
    ];

    pub const PROFILE: [HoloField; 2] = [HoloField::Name, HoloField::Bio];

    pub fn column(self) -> &'static str {
        match self {
            HoloField::Name => "name",
            HoloField::Bio => "bio",
            HoloField::Orcid => "orcid",
            HoloField::Google => "google",
            HoloField::Github => "github",
            HoloField::Twitter => "twitter",
            HoloField::Discord => "discord",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialService {
    Orcid,
    Google,
    Github,
    Twitter,
    Discord,
}

impl CredentialService {
    pub const ALL: [CredentialService; 5] = [
        CredentialService::Orcid,
        CredentialService::Google,
        CredentialService::Github,
        CredentialService::Twitter,
        CredentialService::Discord,
    ];

    pub fn field(self) -> HoloField {
        match self {
            CredentialService::Orcid => HoloField::Orcid,
            CredentialService::Google => HoloField::Google,
            CredentialService::Github => HoloField::Github,
            CredentialService::Twitter => HoloField::Twitter,
            CredentialService::Discord => HoloField::Discord,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.field().column()
    }
}

impl FromStr for CredentialService {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        CredentialService::ALL
            .into_iter()
            .find(|service| service.as_str() == s)
            .ok_or_else(|| CacheError::InvalidInput(format!("unsupported service '{s}'")))
    }
}

impl fmt::Display for CredentialService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-chain profile snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holo {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub orcid: Option<String>,
    pub google: Option<String>,
    pub github: Option<String>,
    pub twitter: Option<String>,
    pub discord: Option<String>,
}

impl Holo {
    pub fn get(&self, field: HoloField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set(&mut self, field: HoloField, value: Option<String>) {
        *self.slot_mut(field) = value;
    }

    fn slot(&self, field: HoloField) -> &Option<String> {
        match field {
            HoloField::Name => &self.name,
            HoloField::Bio => &self.bio,
            HoloField::Orcid => &self.orcid,
            HoloField::Google => &self.google,
            HoloField::Github => &self.github,
            HoloField::Twitter => &self.twitter,
            HoloField::Discord => &self.discord,
        }
    }

    fn slot_mut(&mut self, field: HoloField) -> &mut Option<String> {
        match field {
            HoloField::Name => &mut self.name,
            HoloField::Bio => &mut self.bio,
            HoloField::Orcid => &mut self.orcid,
            HoloField::Google => &mut self.google,
            HoloField::Github => &mut self.github,
            HoloField::Twitter => &mut self.twitter,
            HoloField::Discord => &mut self.discord,
        }
    }

    /// Builds a holo from one chain's section of a `get_holo` response.
    /// Keys outside the field table are ignored.
    pub fn from_section(section: &HashMap<String, Option<String>>) -> Self {
        let mut holo = Holo::default();
        for field in HoloField::ALL {
            holo.set(field, section.get(field.column()).cloned().flatten());
        }
        holo
    }

    pub fn is_empty(&self) -> bool {
        HoloField::ALL.iter().all(|field| self.get(*field).is_none())
    }

    /// Case-insensitive substring match over every non-null field.
    /// `needle` must already be lowercase.
    pub fn matches_text(&self, needle: &str) -> bool {
        HoloField::ALL.iter().any(|field| {
            self.get(*field)
                .is_some_and(|value| value.to_lowercase().contains(needle))
        })
    }
}

/// Result of `get_holo`: chain name -> field name -> value.
pub type HoloSections = HashMap<String, HashMap<String, Option<String>>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
    pub bio: Option<String>,
}

/// The persisted row for one (chain, address).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheRecord {
    pub chain: ChainId,
    pub address: Address,
    #[serde(flatten)]
    pub holo: Holo,
}

/// Every cached chain's holo for one address, as returned by text search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserHolo {
    pub address: Address,
    #[serde(flatten)]
    pub chains: BTreeMap<ChainId, Holo>,
}

/// Which on-chain registry a listing or subscription refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    Profiles,
    Credential(CredentialService),
}

impl RegistryKind {
    /// Credential registries first, then the profile registry.
    pub fn all() -> Vec<RegistryKind> {
        CredentialService::ALL
            .into_iter()
            .map(RegistryKind::Credential)
            .chain(std::iter::once(RegistryKind::Profiles))
            .collect()
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryKind::Profiles => f.write_str("profiles"),
            RegistryKind::Credential(service) => write!(f, "credential:{service}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChainEvent {
    ProfileSet {
        address: String,
    },
    ProfileRemoved {
        address: String,
    },
    CredentialVerified {
        service: CredentialService,
        verified: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Updated,
    FetchIncomplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub chain: ChainId,
    pub registry: RegistryKind,
    pub started_at: DateTime<Utc>,
    pub listed: usize,
    pub updated: usize,
    pub fetch_incomplete: usize,
    pub failed: usize,
    pub storage_failures: usize,
    pub interrupted: bool,
}

impl BatchReport {
    pub fn new(chain: ChainId, registry: RegistryKind) -> Self {
        Self {
            chain,
            registry,
            started_at: Utc::now(),
            listed: 0,
            updated: 0,
            fetch_incomplete: 0,
            failed: 0,
            storage_failures: 0,
            interrupted: false,
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Updated => self.updated += 1,
            Outcome::FetchIncomplete => self.fetch_incomplete += 1,
        }
    }

    pub fn record_failure(&mut self, err: &CacheError) {
        self.failed += 1;
        if err.is_storage_failure() {
            self.storage_failures += 1;
        }
    }
}
