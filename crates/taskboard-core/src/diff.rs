use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{
  Deserialize,
  Serialize
};
use serde_json::{
  Map,
  Value
};

/// Fields never sent in a partial update.
pub const UNDIFFED_FIELDS: [&str; 3] =
  ["id", "created", "modified"];

/// Changed top-level fields and their new
/// serialized values.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct FieldDiff(BTreeMap<String, Value>);

impl FieldDiff {
  /// Compares the serialized form of each
  /// field.
  pub fn between<T: Serialize>(
    before: &T,
    after: &T
  ) -> Result<Self, serde_json::Error> {
    let before = to_object(before)?;
    let after = to_object(after)?;

    let mut changed = BTreeMap::new();
    for (key, value) in &after {
      if UNDIFFED_FIELDS
        .contains(&key.as_str())
      {
        continue;
      }
      if before.get(key) != Some(value) {
        changed
          .insert(key.clone(), value.clone());
      }
    }
    for key in before.keys() {
      if !after.contains_key(key)
        && !UNDIFFED_FIELDS
          .contains(&key.as_str())
      {
        changed
          .insert(key.clone(), Value::Null);
      }
    }

    Ok(Self(changed))
  }

  pub fn single(
    field: &str,
    value: impl Serialize
  ) -> Result<Self, serde_json::Error> {
    let mut map = BTreeMap::new();
    map.insert(
      field.to_string(),
      serde_json::to_value(value)?
    );
    Ok(Self(map))
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn contains(
    &self,
    field: &str
  ) -> bool {
    self.0.contains_key(field)
  }

  pub fn get(
    &self,
    field: &str
  ) -> Option<&Value> {
    self.0.get(field)
  }

  pub fn fields(
    &self
  ) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  /// Returns `target` with the changed
  /// fields merged in.
  pub fn apply_to<T>(
    &self,
    target: &T
  ) -> Result<T, serde_json::Error>
  where
    T: Serialize + DeserializeOwned
  {
    let mut object = to_object(target)?;
    for (key, value) in &self.0 {
      object.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(
      object
    ))
  }
}

fn to_object<T: Serialize>(
  value: &T
) -> Result<Map<String, Value>, serde_json::Error>
{
  match serde_json::to_value(value)? {
    | Value::Object(map) => Ok(map),
    | other => {
      let mut map = Map::new();
      map.insert("value".to_string(), other);
      Ok(map)
    }
  }
}
