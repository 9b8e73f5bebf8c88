use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type PresetId = u32;

/// Deepest category level the traversal descends into. Anything below is skipped.
pub const MAX_CATEGORY_DEPTH: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRoot {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub categories: Vec<CategoryNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub name: String,
    #[serde(default)]
    pub subcategories: Option<Vec<CategoryNode>>,
    #[serde(default)]
    pub presets: Option<Vec<RemotePreset>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemotePreset {
    pub id: PresetId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub version: u32,
    #[serde(with = "timestamp")]
    pub updated_at: OffsetDateTime,
    pub data: String,
}

/// One stop of a depth-first catalog walk.
#[derive(Debug, Clone, Copy)]
pub enum CatalogVisit<'a> {
    Category {
        node: &'a CategoryNode,
        depth: usize,
    },
    Preset {
        preset: &'a RemotePreset,
        depth: usize,
    },
}

impl CatalogRoot {
    /// Walks every category and preset, presets of a node before its subcategories.
    /// Returns the number of categories skipped for exceeding [`MAX_CATEGORY_DEPTH`].
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(CatalogVisit<'a>)) -> usize {
        let mut skipped = 0;
        for category in &self.categories {
            skipped += walk_node(category, 0, visit);
        }
        skipped
    }

    pub fn presets(&self) -> Vec<&RemotePreset> {
        let mut out = Vec::new();
        self.walk(&mut |visit| {
            if let CatalogVisit::Preset { preset, .. } = visit {
                out.push(preset);
            }
        });
        out
    }

    pub fn find_preset(&self, id: PresetId) -> Option<&RemotePreset> {
        self.presets().into_iter().find(|preset| preset.id == id)
    }

    pub fn preset_count(&self) -> usize {
        self.presets().len()
    }
}

fn walk_node<'a>(
    node: &'a CategoryNode,
    depth: usize,
    visit: &mut dyn FnMut(CatalogVisit<'a>),
) -> usize {
    if depth >= MAX_CATEGORY_DEPTH {
        return 1;
    }

    visit(CatalogVisit::Category { node, depth });
    for preset in node.presets.iter().flatten() {
        visit(CatalogVisit::Preset {
            preset,
            depth: depth + 1,
        });
    }

    let mut skipped = 0;
    for child in node.subcategories.iter().flatten() {
        skipped += walk_node(child, depth + 1, visit);
    }
    skipped
}

/// Server timestamps usually carry an offset; ones that don't are read as UTC.
mod timestamp {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime};

    pub fn serialize<S: Serializer>(
        value: &OffsetDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<OffsetDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("unrecognized timestamp: {raw}")))
    }

    pub(super) fn parse(value: &str) -> Option<OffsetDateTime> {
        let trimmed = value.trim();
        if let Ok(dt) = OffsetDateTime::parse(trimmed, &Rfc3339) {
            return Some(dt);
        }
        let naive_format = time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
        );
        if let Ok(dt) = PrimitiveDateTime::parse(trimmed, &naive_format) {
            return Some(dt.assume_utc());
        }
        let spaced_format =
            time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        PrimitiveDateTime::parse(trimmed, &spaced_format)
            .ok()
            .map(PrimitiveDateTime::assume_utc)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn remote(id: PresetId, version: u32, data: &str) -> RemotePreset {
        RemotePreset {
            id,
            name: format!("Preset {id}"),
            description: None,
            version,
            updated_at: OffsetDateTime::UNIX_EPOCH,
            data: data.to_string(),
        }
    }

    const CATALOG_JSON: &str = r#"{
        "id": 3,
        "name": "Codex Example",
        "description": "Example presets",
        "categories": [
            {
                "name": "Configuration Presets",
                "presets": [
                    {
                        "id": 1,
                        "name": "Fast",
                        "description": "Turns setting one off",
                        "version": 2,
                        "updatedAt": "2024-05-01T12:00:00Z",
                        "data": "{\"settingOne\":false}"
                    }
                ]
            },
            {
                "name": "Modular Presets",
                "subcategories": [
                    {
                        "name": "Nested",
                        "presets": [
                            {
                                "id": 4,
                                "name": "Mod. Preset",
                                "version": 3,
                                "updatedAt": "2024-06-11T08:30:00.250Z",
                                "data": "{\"name\":\"Mod. Preset\"}"
                            }
                        ]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_catalog_response() {
        let catalog: CatalogRoot = serde_json::from_str(CATALOG_JSON).unwrap();
        assert_eq!(catalog.name, "Codex Example");
        assert_eq!(catalog.categories.len(), 2);
        assert!(catalog.categories[1].presets.is_none());

        let preset = catalog.find_preset(4).unwrap();
        assert_eq!(preset.version, 3);
        assert_eq!(preset.description, None);
        assert_eq!(preset.updated_at.year(), 2024);
    }

    #[test]
    fn walk_visits_presets_before_subcategories() {
        let catalog: CatalogRoot = serde_json::from_str(CATALOG_JSON).unwrap();
        let mut names = Vec::new();
        catalog.walk(&mut |visit| match visit {
            CatalogVisit::Category { node, depth } => names.push(format!("{depth}:{}", node.name)),
            CatalogVisit::Preset { preset, depth } => {
                names.push(format!("{depth}:#{}", preset.id))
            }
        });
        assert_eq!(
            names,
            vec![
                "0:Configuration Presets",
                "1:#1",
                "0:Modular Presets",
                "1:Nested",
                "2:#4"
            ]
        );
    }

    #[test]
    fn walk_skips_categories_past_depth_limit() {
        let mut node = CategoryNode {
            name: "leaf".to_string(),
            subcategories: None,
            presets: Some(vec![remote(7, 1, "{}")]),
        };
        for level in 0..MAX_CATEGORY_DEPTH {
            node = CategoryNode {
                name: format!("level {level}"),
                subcategories: Some(vec![node]),
                presets: None,
            };
        }
        let catalog = CatalogRoot {
            id: 1,
            name: "deep".to_string(),
            description: String::new(),
            categories: vec![node],
        };

        let skipped = catalog.walk(&mut |_| {});
        assert_eq!(skipped, 1);
        assert!(catalog.find_preset(7).is_none());
    }

    #[test]
    fn reads_timestamps_without_offset_as_utc() {
        let raw = r#"{"id": 2, "name": "x", "version": 1, "updatedAt": "2024-05-01T12:00:00", "data": "{}"}"#;
        let preset: RemotePreset = serde_json::from_str(raw).unwrap();
        assert_eq!(preset.updated_at.offset(), time::UtcOffset::UTC);
        assert_eq!(preset.updated_at.hour(), 12);

        let fractional = timestamp::parse("2024-05-01T12:00:00.125").unwrap();
        assert_eq!(fractional.millisecond(), 125);
        assert_eq!(
            timestamp::parse("2024-05-01 08:30:00").map(|dt| dt.minute()),
            Some(30)
        );
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn rejects_preset_without_data() {
        let raw = r#"{"id": 1, "name": "x", "version": 1, "updatedAt": "2024-05-01T12:00:00Z"}"#;
        assert!(serde_json::from_str::<RemotePreset>(raw).is_err());
    }
}
