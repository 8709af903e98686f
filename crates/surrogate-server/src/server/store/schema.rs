use surrogate::{Backing, EntityKind};

/// SQL for one kind's mapping table.
///
/// Sequence kinds get `<kind>_ids(id INTEGER PRIMARY KEY AUTOINCREMENT,
/// <key columns>[, release])` with a `UNIQUE` constraint over the key
/// columns; the id is the sequence. Analysis ids are their own key.
#[derive(Clone, Debug)]
pub struct Table {
    pub create: String,
    pub find: String,
    pub insert: String,
    pub export: String,
}

impl Table {
    /// `None` for kinds that are never stored.
    pub fn new(kind: EntityKind) -> Option<Self> {
        let name = format!("{kind}_ids");
        match kind.backing() {
            Backing::Derived => None,
            Backing::Identity => Some(Self {
                create: format!("CREATE TABLE IF NOT EXISTS {name} (id TEXT PRIMARY KEY NOT NULL);"),
                find: format!("SELECT id FROM {name} WHERE id = ?1"),
                insert: format!("INSERT INTO {name} (id) VALUES (?1)"),
                export: format!("SELECT id FROM {name} ORDER BY id"),
            }),
            Backing::Sequence => {
                let keys: Vec<String> = kind.key_params().iter().map(|p| snake_case(p)).collect();
                let mut stored = keys.clone();
                if kind.takes_release() {
                    stored.push("release".to_string());
                }

                let definitions: Vec<String> = keys
                    .iter()
                    .map(|column| format!("{column} TEXT NOT NULL"))
                    .chain(kind.takes_release().then(|| "release TEXT NOT NULL DEFAULT ''".to_string()))
                    .collect();
                let matches: Vec<String> = keys
                    .iter()
                    .enumerate()
                    .map(|(i, column)| format!("{column} = ?{}", i + 1))
                    .collect();
                let placeholders: Vec<String> = (1..=stored.len()).map(|i| format!("?{i}")).collect();

                Some(Self {
                    create: format!(
                        "CREATE TABLE IF NOT EXISTS {name} (\
                         id INTEGER PRIMARY KEY AUTOINCREMENT, {}, UNIQUE ({}));",
                        definitions.join(", "),
                        keys.join(", ")
                    ),
                    find: format!("SELECT id FROM {name} WHERE {}", matches.join(" AND ")),
                    insert: format!(
                        "INSERT INTO {name} ({}) VALUES ({})",
                        stored.join(", "),
                        placeholders.join(", ")
                    ),
                    export: format!("SELECT id, {} FROM {name} ORDER BY id", stored.join(", ")),
                })
            }
        }
    }
}

/// `submittedDonorId` → `submitted_donor_id`
fn snake_case(param: &str) -> String {
    let mut out = String::with_capacity(param.len() + 4);
    for c in param.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
