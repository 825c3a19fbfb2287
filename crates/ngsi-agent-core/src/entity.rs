//! NGSI v2 entity helper.
//!
//! Transforms may return any `Serialize` type; [`Entity`] is a convenience
//! that renders the normalized NGSI v2 shape expected by context brokers:
//!
//! ```json
//! { "id": "Fruit-Apple", "type": "Fruit", "color": { "type": "Text", "value": "Red" } }
//! ```

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{json, Map, Value};

/// A context entity with typed attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: String,
    pub kind: String,
    attributes: Map<String, Value>,
}

impl Entity {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            attributes: Map::new(),
        }
    }

    /// Add an attribute, inferring its NGSI type from the JSON value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        let kind = infer_type(&value);
        self.add_typed(name, value, kind)
    }

    /// Add an attribute with an explicit NGSI type (e.g. `"DateTime"`).
    pub fn add_typed(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        kind: &str,
    ) -> &mut Self {
        self.attributes.insert(
            name.into(),
            json!({ "type": kind, "value": value.into() }),
        );
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).and_then(|a| a.get("value"))
    }

    /// Normalized JSON form; serialization errors are returned, not hidden.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

fn infer_type(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "Text",
        Value::Number(_) => "Number",
        Value::Bool(_) => "Boolean",
        Value::Null => "None",
        Value::Array(_) | Value::Object(_) => "StructuredValue",
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attributes.len() + 2))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("type", &self.kind)?;
        for (name, attr) in &self.attributes {
            map.serialize_entry(name, attr)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_normalized_form() {
        let mut e = Entity::new("Fruit-Apple", "Fruit");
        e.add("color", "Red").add("weight", 120).add("organic", true);

        let v = e.to_json().unwrap();
        assert_eq!(v["id"], "Fruit-Apple");
        assert_eq!(v["type"], "Fruit");
        assert_eq!(v["color"], json!({"type": "Text", "value": "Red"}));
        assert_eq!(v["weight"]["type"], "Number");
        assert_eq!(v["organic"]["type"], "Boolean");
    }

    #[test]
    fn test_explicit_type_wins() {
        let mut e = Entity::new("Room1", "Room");
        e.add_typed("dateObserved", "2021-03-01T00:00:00Z", "DateTime");
        assert_eq!(e.to_json().unwrap()["dateObserved"]["type"], "DateTime");
        assert_eq!(
            e.attribute("dateObserved"),
            Some(&json!("2021-03-01T00:00:00Z"))
        );
    }

    #[test]
    fn test_to_json_matches_wire_message() {
        let mut e = Entity::new("Parking-7", "ParkingSpot");
        e.add("status", "free").add("location", json!({"lat": 43.3, "lon": -8.4}));

        let wire: Value = serde_json::from_str(&serde_json::to_string(&e).unwrap()).unwrap();
        assert_eq!(e.to_json().unwrap(), wire);
        assert_eq!(wire["location"]["type"], "StructuredValue");
    }
}
