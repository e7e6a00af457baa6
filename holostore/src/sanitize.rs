//! Markup stripping for remote profile text.
//!
//! Everything fetched from a chain is user-controlled and is later served back
//! by the search surface, so no text reaches [`crate::store::CacheStore`]
//! without passing through here. The store only accepts a [`FieldUpdate`],
//! and every `FieldUpdate` constructor sanitizes its input.

use crate::models::{CredentialService, Holo, HoloField, Profile};

/// Removes scripts, event-handler attributes and unsafe tags; harmless
/// formatting tags survive and bare text is HTML-escaped.
pub fn sanitize_text(raw: &str) -> String {
    ammonia::clean(raw)
}

/// Applies [`sanitize_text`] to every present field. Absent fields stay absent.
pub fn sanitize(holo: Holo) -> Holo {
    let mut clean = Holo::default();
    for field in HoloField::ALL {
        clean.set(field, holo.get(field).map(sanitize_text));
    }
    clean
}

/// A set of column assignments for one record. Absent values are written as NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdate {
    values: Vec<(HoloField, Option<String>)>,
}

impl FieldUpdate {
    /// Overwrites every field: a field missing from `holo` clears the stored value.
    pub fn full(holo: Holo) -> Self {
        let clean = sanitize(holo);
        Self {
            values: HoloField::ALL
                .into_iter()
                .map(|field| (field, clean.get(field).map(str::to_string)))
                .collect(),
        }
    }

    pub fn profile(profile: &Profile) -> Self {
        Self {
            values: vec![
                (HoloField::Name, profile.name.as_deref().map(sanitize_text)),
                (HoloField::Bio, profile.bio.as_deref().map(sanitize_text)),
            ],
        }
    }

    pub fn credential(service: CredentialService, value: Option<&str>) -> Self {
        Self {
            values: vec![(service.field(), value.map(sanitize_text))],
        }
    }

    pub fn fields(&self) -> &[(HoloField, Option<String>)] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_and_handlers_are_stripped() {
        let cleaned = sanitize_text("hi<script>alert('x')</script><img src=\"a.png\" onerror=\"steal()\">");
        assert!(!cleaned.contains("<script"));
        assert!(!cleaned.contains("alert"));
        assert!(!cleaned.contains("onerror"));
        assert!(cleaned.starts_with("hi"));
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(sanitize_text("Ada Lovelace"), "Ada Lovelace");
        assert_eq!(sanitize_text("0000-0002-1825-0097"), "0000-0002-1825-0097");
    }

    #[test]
    fn absent_fields_stay_absent() {
        let holo = Holo {
            name: Some("<b>Ada</b><script>x()</script>".to_string()),
            github: None,
            ..Holo::default()
        };
        let clean = sanitize(holo);
        assert_eq!(clean.name.as_deref(), Some("<b>Ada</b>"));
        assert_eq!(clean.github, None);
        assert_eq!(clean.bio, None);
    }

    #[test]
    fn full_update_covers_every_column() {
        let update = FieldUpdate::full(Holo {
            bio: Some("<iframe src=\"evil\"></iframe>physicist".to_string()),
            ..Holo::default()
        });
        assert_eq!(update.fields().len(), HoloField::ALL.len());
        let bio = update
            .fields()
            .iter()
            .find(|(field, _)| *field == HoloField::Bio)
            .and_then(|(_, value)| value.clone());
        assert_eq!(bio.as_deref(), Some("physicist"));
    }

    #[test]
    fn credential_update_touches_only_its_column() {
        let update = FieldUpdate::credential(CredentialService::Twitter, Some("@ada"));
        assert_eq!(
            update.fields(),
            &[(HoloField::Twitter, Some("@ada".to_string()))]
        );
    }
}
