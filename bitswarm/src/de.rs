use serde::{de, Deserialize};
use url::Url;

// Deserialiser helpers for metainfo fields that need a conversion serde's
// derive macro can't express directly.

pub fn url_deserialize<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Url::parse(&s).map_err(de::Error::custom)
}

pub fn path_deserialize<'de, D>(deserializer: D) -> Result<std::path::PathBuf, D::Error>
where
    D: de::Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    if raw.is_empty() {
        return Err(de::Error::custom("file path has no components"));
    }
    Ok(raw.into_iter().collect())
}
