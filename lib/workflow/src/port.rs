//! Typed ports for activity inputs and outputs.
//!
//! Every activity exposes the fields of its input and output record as ports.
//! Port types are derived once from the Rust types through `schemars`, so
//! route validation compares schemas instead of inspecting values at run time.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Schema keywords that describe a field without constraining its type.
const ANNOTATION_KEYWORDS: &[&str] = &[
    "$comment",
    "default",
    "deprecated",
    "description",
    "examples",
    "readOnly",
    "title",
    "writeOnly",
];

/// Which side of an activity a port belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// The JSON Schema of a single port, with annotations removed.
///
/// Two ports carry the same type exactly when their schemas are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortSchema(JsonValue);

impl PortSchema {
    /// Creates a port schema from a raw JSON Schema value.
    #[must_use]
    pub fn from_json(mut schema: JsonValue) -> Self {
        strip_annotations(&mut schema);
        Self(schema)
    }

    /// Returns the underlying schema.
    #[must_use]
    pub fn as_json(&self) -> &JsonValue {
        &self.0
    }

    /// Returns true if a value of this type can be routed into `other`.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self == other
    }
}

impl fmt::Display for PortSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ports of one side (input or output) of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ports {
    type_name: String,
    fields: BTreeMap<String, PortSchema>,
}

impl Ports {
    /// Derives the ports of a record type from its JSON Schema.
    ///
    /// Each top-level property of `T` becomes one port. Non-record types
    /// yield no ports.
    #[must_use]
    pub fn of<T: JsonSchema>() -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(JsonValue::Null);
        let definitions = schema
            .get("$defs")
            .and_then(JsonValue::as_object)
            .cloned()
            .unwrap_or_default();
        let fields = schema
            .get("properties")
            .and_then(JsonValue::as_object)
            .map(|properties| {
                properties
                    .iter()
                    .map(|(name, property)| {
                        let mut property = property.clone();
                        inline_references(&mut property, &definitions, &mut Vec::new());
                        (name.clone(), PortSchema::from_json(property))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            type_name: T::schema_name().into_owned(),
            fields,
        }
    }

    /// Creates ports from explicit field schemas.
    #[must_use]
    pub fn from_fields(
        type_name: impl Into<String>,
        fields: impl IntoIterator<Item = (String, PortSchema)>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            fields: fields.into_iter().collect(),
        }
    }

    /// Returns the name of the record type these ports were derived from.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the schema of the named port, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PortSchema> {
        self.fields.get(name)
    }

    /// Returns the port names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the number of ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no ports.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Replaces every `$ref` into `$defs` with the referenced schema, so that
/// port equality compares structure rather than type names.
///
/// A reference back into a definition that is still being expanded is a
/// recursive type. It is left as a `$ref` since it cannot be inlined.
fn inline_references(
    value: &mut JsonValue,
    definitions: &serde_json::Map<String, JsonValue>,
    expanding: &mut Vec<String>,
) {
    match value {
        JsonValue::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(JsonValue::as_str)
                .and_then(|reference| reference.strip_prefix("#/$defs/"))
                .map(str::to_owned);

            if let Some(name) = target
                && !expanding.contains(&name)
                && let Some(JsonValue::Object(definition)) = definitions.get(&name)
            {
                map.remove("$ref");
                for (key, keyword) in definition {
                    map.entry(key.clone()).or_insert_with(|| keyword.clone());
                }
                expanding.push(name);
                for child in map.values_mut() {
                    inline_references(child, definitions, expanding);
                }
                expanding.pop();
                return;
            }

            for child in map.values_mut() {
                inline_references(child, definitions, expanding);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                inline_references(item, definitions, expanding);
            }
        }
        _ => {}
    }
}

fn strip_annotations(value: &mut JsonValue) {
    match value {
        JsonValue::Object(map) => {
            map.retain(|key, _| !ANNOTATION_KEYWORDS.contains(&key.as_str()));
            for (key, child) in map.iter_mut() {
                // Keys of these maps are names chosen by the author, not keywords.
                if key == "properties" || key == "$defs" {
                    if let JsonValue::Object(named) = child {
                        named.values_mut().for_each(strip_annotations);
                    }
                } else {
                    strip_annotations(child);
                }
            }
        }
        JsonValue::Array(items) => items.iter_mut().for_each(strip_annotations),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Invoice {
        /// Invoice total in cents.
        total: i64,
        customer: String,
        note: Option<String>,
    }

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Payment {
        amount: i64,
        reference: u32,
    }

    #[test]
    fn ports_derived_from_record_fields() {
        let ports = Ports::of::<Invoice>();
        assert_eq!(ports.type_name(), "Invoice");
        assert_eq!(ports.len(), 3);
        assert_eq!(ports.names().collect::<Vec<_>>(), vec!["customer", "note", "total"]);
    }

    #[test]
    fn doc_comments_do_not_affect_type_equality() {
        let invoice = Ports::of::<Invoice>();
        let payment = Ports::of::<Payment>();
        let total = invoice.get("total").expect("total port");
        let amount = payment.get("amount").expect("amount port");
        assert!(total.matches(amount));
    }

    #[test]
    fn integer_widths_are_distinct_types() {
        let invoice = Ports::of::<Invoice>();
        let payment = Ports::of::<Payment>();
        let total = invoice.get("total").expect("total port");
        let reference = payment.get("reference").expect("reference port");
        assert!(!total.matches(reference));
    }

    #[test]
    fn optional_field_differs_from_required() {
        let invoice = Ports::of::<Invoice>();
        let customer = invoice.get("customer").expect("customer port");
        let note = invoice.get("note").expect("note port");
        assert!(!customer.matches(note));
    }

    mod billing {
        use schemars::JsonSchema;

        #[derive(JsonSchema)]
        #[allow(dead_code)]
        pub struct Money {
            pub cents: i64,
        }

        #[derive(JsonSchema)]
        #[allow(dead_code)]
        pub struct Charge {
            pub amount: Money,
        }
    }

    mod shipping {
        use schemars::JsonSchema;

        #[derive(JsonSchema)]
        #[allow(dead_code)]
        pub struct Money {
            pub label: String,
        }

        #[derive(JsonSchema)]
        #[allow(dead_code)]
        pub struct Parcel {
            pub amount: Money,
        }
    }

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Refund {
        amount: billing::Money,
    }

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Node {
        value: i64,
        next: Option<Box<Node>>,
    }

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct List {
        head: Node,
    }

    #[test]
    fn same_named_types_compare_by_shape() {
        let charge = Ports::of::<billing::Charge>();
        let parcel = Ports::of::<shipping::Parcel>();
        let paid = charge.get("amount").expect("charge amount");
        let shipped = parcel.get("amount").expect("parcel amount");
        assert!(!paid.matches(shipped));
        assert!(paid.as_json().get("$ref").is_none());
    }

    #[test]
    fn same_nested_type_still_matches() {
        let charge = Ports::of::<billing::Charge>();
        let refund = Ports::of::<Refund>();
        let charged = charge.get("amount").expect("charge amount");
        let refunded = refund.get("amount").expect("refund amount");
        assert!(charged.matches(refunded));
    }

    #[test]
    fn recursive_types_terminate() {
        let list = Ports::of::<List>();
        let head = list.get("head").expect("head port");
        assert!(head.as_json().get("properties").is_some());
    }

    #[test]
    fn unit_type_has_no_ports() {
        assert!(Ports::of::<()>().is_empty());
    }

    #[test]
    fn nested_property_names_survive_stripping() {
        let schema = PortSchema::from_json(json!({
            "type": "object",
            "description": "dropped",
            "properties": {
                "title": { "type": "string", "description": "dropped too" }
            }
        }));
        assert_eq!(
            schema.as_json(),
            &json!({
                "type": "object",
                "properties": { "title": { "type": "string" } }
            })
        );
    }
}
