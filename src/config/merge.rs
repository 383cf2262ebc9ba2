//! Configuration merge logic
//!
//! Layers are TOML tables merged in precedence order:
//! - Tables: merge by key (recursive)
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use toml::{Table, Value};

/// Merge `overlay` into `base` in place.
pub fn merge_table(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        let overlay_inner = match value {
            Value::Table(inner) => inner,
            other => {
                base.insert(key, other);
                continue;
            }
        };
        if let Some(Value::Table(base_inner)) = base.get_mut(&key) {
            merge_table(base_inner, overlay_inner);
            continue;
        }
        base.insert(key, Value::Table(overlay_inner));
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: impl IntoIterator<Item = Table>) -> Table {
    layers.into_iter().fold(Table::new(), |mut acc, layer| {
        merge_table(&mut acc, layer);
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> Table {
        src.parse::<Table>().unwrap()
    }

    #[test]
    fn test_scalar_override() {
        let merged = merge_layers([table("strict = false"), table("strict = true")]);
        assert_eq!(merged["strict"].as_bool(), Some(true));
    }

    #[test]
    fn test_nested_tables_merge_by_key() {
        let merged = merge_layers([
            table("[prefetch]\nenabled = true\nworkers = 6"),
            table("[prefetch]\nworkers = 2"),
        ]);
        assert_eq!(merged["prefetch"]["enabled"].as_bool(), Some(true));
        assert_eq!(merged["prefetch"]["workers"].as_integer(), Some(2));
    }

    #[test]
    fn test_array_replace() {
        let merged = merge_layers([
            table("names = [\"BUILD.bazel\", \"BUILD\"]"),
            table("names = [\"BUILD.plz\"]"),
        ]);
        let names = merged["names"].as_array().unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].as_str(), Some("BUILD.plz"));
    }

    #[test]
    fn test_scalar_replaces_table() {
        let merged = merge_layers([table("[walk]\nstrict = true"), table("walk = 1")]);
        assert_eq!(merged["walk"].as_integer(), Some(1));
    }

    #[test]
    fn test_three_layers() {
        let merged = merge_layers([
            table("[walk]\nstrict = false\ndirective_prefix = \"gazelle\""),
            table("[walk]\ndirective_prefix = \"tool\""),
            table("[walk]\nstrict = true"),
        ]);
        assert_eq!(merged["walk"]["strict"].as_bool(), Some(true));
        assert_eq!(merged["walk"]["directive_prefix"].as_str(), Some("tool"));
    }
}
