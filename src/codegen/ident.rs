//! Turning AI-proposed names into Rust identifiers

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

/// Keywords that cannot be written as raw identifiers.
const UNRAWABLE: &[&str] = &["crate", "self", "super", "Self", "_"];

/// Type names the generated code refers to; an entity must not shadow them.
const RESERVED_TYPES: &[&str] = &["String", "Option", "Vec", "Serialize", "Deserialize"];

/// Methods every generated impl may define besides the per-field accessors.
pub const RESERVED_METHODS: &[&str] = &["all_refs", "record_id"];

/// Split on non-alphanumerics and lower-to-upper case boundaries.
///
/// `controlledRegionID` -> `controlled`, `Region`, `ID`
fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        let boundary = match prev {
            Some(p) if p.is_lowercase() && c.is_uppercase() => true,
            Some(p) if p.is_alphabetic() && c.is_numeric() => false,
            // "IDValue": split before the last capital of a run
            Some(p) if p.is_uppercase() && c.is_uppercase() => {
                chars.get(i + 1).is_some_and(|n| n.is_lowercase())
            }
            _ => false,
        };
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c);
        prev = Some(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// `controlledRegionId` -> `controlled_region_id`. Empty if nothing usable.
pub fn to_snake_case(name: &str) -> String {
    let mut out = words(name)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_");
    if out.starts_with(|c: char| c.is_numeric()) {
        out.insert_str(0, "f_");
    }
    out
}

/// `hex tile` -> `HexTile`. Empty if nothing usable.
pub fn to_pascal_case(name: &str) -> String {
    let mut out: String = words(name)
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect();
    if out.starts_with(|c: char| c.is_numeric()) {
        out.insert(0, 'E');
    }
    out
}

/// Make a snake_case name usable as a field, escaping keywords.
pub fn field_ident(snake: &str) -> String {
    if UNRAWABLE.contains(&snake) {
        format!("{}_", snake)
    } else if KEYWORDS.contains(&snake) {
        format!("r#{}", snake)
    } else {
        snake.to_string()
    }
}

/// Make a PascalCase name usable as a type.
pub fn type_ident(pascal: &str) -> String {
    if UNRAWABLE.contains(&pascal) || RESERVED_TYPES.contains(&pascal) {
        format!("{}_", pascal)
    } else {
        pascal.to_string()
    }
}

/// Identifier without the raw prefix, for building derived names.
pub fn bare(ident: &str) -> &str {
    ident.strip_prefix("r#").unwrap_or(ident)
}

/// Text safe to place on a single comment line.
pub fn one_line(text: &str) -> String {
    text.split(|c: char| c.is_control())
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Module (and file) name for a category. Keywords get a trailing `_`.
pub fn module_name(category: &str) -> String {
    let snake = to_snake_case(category);
    if snake.is_empty() {
        "category".to_string()
    } else if KEYWORDS.contains(&snake.as_str()) || UNRAWABLE.contains(&snake.as_str()) {
        format!("{}_", snake)
    } else {
        snake
    }
}
