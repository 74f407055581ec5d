//! Link discovery inside raw CMS entities.
//!
//! Entities are kept as opaque [`serde_json::Value`]s. The only structure
//! this module interprets is the `sys` envelope (for identity) and the field
//! map (for `Link` values). Entities come in two shapes, bare (`sys.id`) and
//! wrapped (`data.sys.id`); both are accepted everywhere.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// The kind of entity a cache instance resolves.
///
/// A cache is bound to exactly one entity type; links of any other
/// `linkType` are ignored during harvesting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Entry,
    Asset,
}

/// Error returned when parsing an unsupported entity type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("specify an entity type for the cache: {0:?} is not supported")]
pub struct UnknownEntityType(String);

impl EntityType {
    /// The value this type matches against `sys.linkType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Entry => "Entry",
            EntityType::Asset => "Asset",
        }
    }

    /// The collection endpoint of a space serving this type.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityType::Entry => "entries",
            EntityType::Asset => "assets",
        }
    }
}

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Entry" => Ok(EntityType::Entry),
            "Asset" => Ok(EntityType::Asset),
            other => Err(UnknownEntityType(other.to_owned())),
        }
    }
}

/// How a resolution round scans a batch of entities for links.
///
/// A profile is captured per call, so runtime changes (like a grid updating
/// its displayed columns) apply to the next round without affecting one that
/// is already queued.
#[derive(Clone, Debug)]
pub(crate) struct ScanProfile {
    /// Only links with this `linkType` are harvested.
    pub entity_type: EntityType,
    /// Cap on harvested elements per link array.
    ///
    /// Elements beyond the cap are neither fetched nor substituted; they
    /// keep their original link stubs.
    pub link_limit: usize,
    /// When set, field values are maps keyed by locale code and only the
    /// value under this key is inspected.
    pub locale: Option<String>,
    /// When set, fields whose id is not in this set are skipped entirely.
    pub allowed_fields: Option<HashSet<String>>,
}

impl ScanProfile {
    fn scans_field(&self, field_id: &str) -> bool {
        match &self.allowed_fields {
            Some(allowed) => allowed.contains(field_id),
            None => true,
        }
    }
}

/// An unresolved link as found inside an entity's fields.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Link<'a> {
    pub link_type: &'a str,
    pub id: &'a str,
}

impl Link<'_> {
    fn matches(&self, entity_type: EntityType) -> bool {
        self.link_type == entity_type.as_str()
    }
}

/// Extracts the id of a bare (`sys.id`) or wrapped (`data.sys.id`) entity.
pub(crate) fn entity_id(entity: &Value) -> Option<&str> {
    entity
        .pointer("/sys/id")
        .or_else(|| entity.pointer("/data/sys/id"))
        .and_then(Value::as_str)
}

/// Returns the field map of a bare or wrapped entity.
fn entity_fields(entity: &Value) -> Option<&Map<String, Value>> {
    entity
        .get("fields")
        .or_else(|| entity.pointer("/data/fields"))
        .and_then(Value::as_object)
}

fn entity_fields_mut(entity: &mut Value) -> Option<&mut Map<String, Value>> {
    if entity.get("fields").is_some() {
        entity.get_mut("fields").and_then(Value::as_object_mut)
    } else {
        entity
            .pointer_mut("/data/fields")
            .and_then(Value::as_object_mut)
    }
}

/// Interprets a value as a link, if it is one.
///
/// A link is an object with `sys.type == "Link"` carrying a `linkType` and
/// an `id`.
pub(crate) fn as_link(value: &Value) -> Option<Link<'_>> {
    let sys = value.get("sys")?;
    if sys.get("type")?.as_str()? != "Link" {
        return None;
    }
    Some(Link {
        link_type: sys.get("linkType")?.as_str()?,
        id: sys.get("id")?.as_str()?,
    })
}

/// Whether a value is a link array.
///
/// Only the first element is checked; arrays are assumed homogeneous.
fn is_link_array(value: &Value) -> bool {
    value
        .as_array()
        .and_then(|items| items.first())
        .is_some_and(|first| as_link(first).is_some())
}

/// The placeholder substituted for a link whose target could not be
/// resolved. Consumers render these as "missing" chips instead of failing
/// the whole view.
pub fn missing_stub(entity_type: EntityType, id: &str) -> Value {
    json!({
        "sys": {
            "type": entity_type.as_str(),
            "id": id,
            "missing": true,
        }
    })
}

/// Collects the ids referenced by `entities` that are not yet cached.
///
/// The result preserves first-seen order and contains no duplicates. Links
/// whose `linkType` does not match the profile, ids already cached, and
/// array elements beyond the link cap are all skipped. Entities without a
/// recognizable field map are logged and skipped so one malformed entity
/// does not block resolution of the rest.
pub(crate) fn harvest_missing_ids<F>(
    entities: &[Value],
    profile: &ScanProfile,
    is_cached: F,
) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    let mut missing = Vec::new();
    let mut seen = HashSet::new();

    for entity in entities {
        let Some(fields) = entity_fields(entity) else {
            metric!(counter("cache.entity.malformed") += 1);
            tracing::warn!(
                id = entity_id(entity).unwrap_or("<no id>"),
                "skipping entity without a field map"
            );
            continue;
        };

        for (field_id, value) in fields {
            if !profile.scans_field(field_id) {
                continue;
            }
            let Some(value) = localized(value, profile) else {
                continue;
            };

            let mut consider = |link: Link<'_>| {
                if link.matches(profile.entity_type)
                    && !seen.contains(link.id)
                    && !is_cached(link.id)
                {
                    seen.insert(link.id.to_owned());
                    missing.push(link.id.to_owned());
                }
            };

            if let Some(link) = as_link(value) {
                consider(link);
            } else if is_link_array(value) {
                if let Some(items) = value.as_array() {
                    for item in items.iter().take(profile.link_limit) {
                        if let Some(link) = as_link(item) {
                            consider(link);
                        }
                    }
                }
            }
        }
    }

    missing
}

/// Rewrites copies of `entities`, substituting every matching link with its
/// resolved target.
///
/// `lookup` supplies cached entities by id; links without a cached target
/// become [`missing_stub`]s. Array elements beyond the link cap were never
/// requested and keep their original link stubs.
pub(crate) fn substitute_links<F>(
    entities: &[Value],
    profile: &ScanProfile,
    lookup: F,
) -> Vec<Value>
where
    F: Fn(&str) -> Option<Value>,
{
    entities
        .iter()
        .map(|entity| {
            let mut entity = entity.clone();
            substitute_entity(&mut entity, profile, &lookup);
            entity
        })
        .collect()
}

fn substitute_entity<F>(entity: &mut Value, profile: &ScanProfile, lookup: &F)
where
    F: Fn(&str) -> Option<Value>,
{
    let Some(fields) = entity_fields_mut(entity) else {
        return;
    };

    for (field_id, value) in fields.iter_mut() {
        if !profile.scans_field(field_id) {
            continue;
        }
        let Some(value) = localized_mut(value, profile) else {
            continue;
        };

        if as_link(value).is_some() {
            substitute_value(value, profile, lookup);
        } else if is_link_array(value) {
            if let Some(items) = value.as_array_mut() {
                for item in items.iter_mut().take(profile.link_limit) {
                    substitute_value(item, profile, lookup);
                }
            }
        }
    }
}

fn substitute_value<F>(value: &mut Value, profile: &ScanProfile, lookup: &F)
where
    F: Fn(&str) -> Option<Value>,
{
    let Some(link) = as_link(value) else {
        return;
    };
    if !link.matches(profile.entity_type) {
        return;
    }
    let id = link.id.to_owned();
    *value = lookup(&id).unwrap_or_else(|| missing_stub(profile.entity_type, &id));
}

fn localized<'a>(value: &'a Value, profile: &ScanProfile) -> Option<&'a Value> {
    match &profile.locale {
        Some(code) => value.get(code),
        None => Some(value),
    }
}

fn localized_mut<'a>(value: &'a mut Value, profile: &ScanProfile) -> Option<&'a mut Value> {
    match &profile.locale {
        Some(code) => value.get_mut(code),
        None => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(entity_type: EntityType) -> ScanProfile {
        ScanProfile {
            entity_type,
            link_limit: 5,
            locale: None,
            allowed_fields: None,
        }
    }

    #[test]
    fn test_entity_id_shapes() {
        let bare = json!({"sys": {"id": "e1", "type": "Entry"}});
        let wrapped = json!({"data": {"sys": {"id": "e2", "type": "Entry"}}});
        let neither = json!({"fields": {}});

        assert_eq!(entity_id(&bare), Some("e1"));
        assert_eq!(entity_id(&wrapped), Some("e2"));
        assert_eq!(entity_id(&neither), None);
    }

    #[test]
    fn test_link_detection() {
        let link = json!({"sys": {"type": "Link", "linkType": "Entry", "id": "e1"}});
        let entity = json!({"sys": {"type": "Entry", "id": "e1"}});

        let parsed = as_link(&link).unwrap();
        assert_eq!(parsed.id, "e1");
        assert_eq!(parsed.link_type, "Entry");
        assert!(as_link(&entity).is_none());
        assert!(as_link(&json!("e1")).is_none());
    }

    #[test]
    fn test_harvest_dedupes_in_first_seen_order() {
        let link = |id: &str| json!({"sys": {"type": "Link", "linkType": "Entry", "id": id}});
        let entities = vec![
            json!({"sys": {"id": "p1"}, "fields": {"a": link("a"), "b": link("b")}}),
            json!({"sys": {"id": "p2"}, "fields": {"a": link("a"), "c": link("c")}}),
        ];

        let missing = harvest_missing_ids(&entities, &profile(EntityType::Entry), |_| false);
        assert_eq!(missing, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_harvest_skips_cached_and_foreign_types() {
        let entities = vec![json!({
            "sys": {"id": "p1"},
            "fields": {
                "cached": {"sys": {"type": "Link", "linkType": "Entry", "id": "hit"}},
                "asset": {"sys": {"type": "Link", "linkType": "Asset", "id": "img"}},
                "fresh": {"sys": {"type": "Link", "linkType": "Entry", "id": "miss"}},
            }
        })];

        let missing =
            harvest_missing_ids(&entities, &profile(EntityType::Entry), |id| id == "hit");
        assert_eq!(missing, vec!["miss"]);
    }

    #[test]
    fn test_harvest_caps_link_arrays() {
        let link = |id: &str| json!({"sys": {"type": "Link", "linkType": "Entry", "id": id}});
        let entities = vec![json!({
            "sys": {"id": "p1"},
            "fields": {"refs": [link("l1"), link("l2"), link("l3")]}
        })];

        let mut capped = profile(EntityType::Entry);
        capped.link_limit = 2;
        let missing = harvest_missing_ids(&entities, &capped, |_| false);
        assert_eq!(missing, vec!["l1", "l2"]);
    }

    #[test]
    fn test_harvest_skips_malformed_entities() {
        let entities = vec![
            json!({"sys": {"id": "broken"}}),
            json!({
                "sys": {"id": "ok"},
                "fields": {"ref": {"sys": {"type": "Link", "linkType": "Entry", "id": "l1"}}}
            }),
        ];

        let missing = harvest_missing_ids(&entities, &profile(EntityType::Entry), |_| false);
        assert_eq!(missing, vec!["l1"]);
    }

    #[test]
    fn test_substitute_resolved_and_missing() {
        let resolved = json!({"sys": {"id": "l1", "type": "Entry"}, "fields": {"title": "one"}});
        let entities = vec![json!({
            "sys": {"id": "p1"},
            "fields": {
                "hit": {"sys": {"type": "Link", "linkType": "Entry", "id": "l1"}},
                "miss": {"sys": {"type": "Link", "linkType": "Entry", "id": "l2"}},
            }
        })];

        let lookup = |id: &str| (id == "l1").then(|| resolved.clone());
        let rewritten = substitute_links(&entities, &profile(EntityType::Entry), lookup);

        assert_eq!(rewritten[0]["fields"]["hit"], resolved);
        assert_eq!(
            rewritten[0]["fields"]["miss"],
            missing_stub(EntityType::Entry, "l2")
        );
    }

    #[test]
    fn test_substitute_leaves_capped_elements_untouched() {
        let link = |id: &str| json!({"sys": {"type": "Link", "linkType": "Entry", "id": id}});
        let entities = vec![json!({
            "sys": {"id": "p1"},
            "fields": {"refs": [link("l1"), link("l2")]}
        })];

        let mut capped = profile(EntityType::Entry);
        capped.link_limit = 1;
        let rewritten = substitute_links(&entities, &capped, |_| None);

        let refs = rewritten[0]["fields"]["refs"].as_array().unwrap();
        assert_eq!(refs[0], missing_stub(EntityType::Entry, "l1"));
        assert_eq!(refs[1], link("l2"));
    }

    #[test]
    fn test_localized_scan() {
        let entities = vec![json!({
            "sys": {"id": "p1"},
            "fields": {
                "ref": {"en-US": {"sys": {"type": "Link", "linkType": "Entry", "id": "l1"}}}
            }
        })];

        let mut localized = profile(EntityType::Entry);
        localized.locale = Some("en-US".to_owned());
        assert_eq!(
            harvest_missing_ids(&entities, &localized, |_| false),
            vec!["l1"]
        );
        // A flat scan must not mistake the locale map for a link.
        assert!(harvest_missing_ids(&entities, &profile(EntityType::Entry), |_| false).is_empty());
    }

    #[test]
    fn test_unknown_entity_type() {
        assert_eq!("Entry".parse::<EntityType>().unwrap(), EntityType::Entry);
        assert!("ContentType".parse::<EntityType>().is_err());
    }
}
