//! Domain types for the sync pipeline.

use errors::MessageError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One employee as delivered by the HR source.
///
/// Only `name` and `identity_number` are required. Fields the pipeline does
/// not interpret are kept in `extra` so the record travels through every
/// stage unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub name: String,
    pub identity_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Photo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kib_number: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub regionals: Vec<Regional>,
    #[serde(flatten)]
    pub extra: Map<String, Value>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>
}

/// Regional zone membership. The slug is the key into [`ZoneMapping`];
/// a missing or null slug maps to nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regional {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>
}

impl Regional {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: Some(slug.into()),
            extra: Map::new()
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl EmployeeRecord {
    pub fn new(name: impl Into<String>, identity_number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity_number: identity_number.into(),
            phone_number: None,
            email: None,
            photo: None,
            kib_number: None,
            regionals: Vec::new(),
            extra: Map::new()
        }
    }

    /// Decodes and checks a raw HR record.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let record: Self =
            serde_json::from_value(value).map_err(|e| MessageError::decode("employee", &e))?;
        record.validate()?;
        Ok(record)
    }

    /// Required identity fields must be present and non-blank.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.name.trim().is_empty() {
            return Err(MessageError::missing("name"));
        }
        if self.identity_number.trim().is_empty() {
            return Err(MessageError::missing("identity_number"));
        }
        Ok(())
    }

    pub fn kib(&self) -> Option<&str> {
        non_empty(self.kib_number.as_ref())
    }

    pub fn photo_link(&self) -> Option<&str> {
        self.photo
            .as_ref()
            .and_then(|photo| non_empty(photo.link.as_ref()))
    }

    pub fn phone(&self) -> Option<&str> {
        non_empty(self.phone_number.as_ref())
    }

    pub fn email_address(&self) -> Option<&str> {
        non_empty(self.email.as_ref())
    }
}

/// The three chained stages of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CreatePerson,
    UpdateIdentifier,
    AssignPrivilege
}

impl Stage {
    pub const ALL: [Stage; 3] = [
        Stage::CreatePerson,
        Stage::UpdateIdentifier,
        Stage::AssignPrivilege
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CreatePerson => "create_person",
            Stage::UpdateIdentifier => "update_identifier",
            Stage::AssignPrivilege => "assign_privilege"
        }
    }

    /// The stage that consumes what this stage publishes.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::CreatePerson => Some(Stage::UpdateIdentifier),
            Stage::UpdateIdentifier => Some(Stage::AssignPrivilege),
            Stage::AssignPrivilege => None
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateIdentifierPayload {
    #[serde(rename = "personId")]
    pub external_person_id: String,
    pub kib_number: String,
    pub employee: EmployeeRecord
}

impl UpdateIdentifierPayload {
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.external_person_id.trim().is_empty() {
            return Err(MessageError::missing("personId"));
        }
        if self.kib_number.trim().is_empty() {
            return Err(MessageError::missing("kib_number"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignPrivilegePayload {
    #[serde(rename = "personId")]
    pub external_person_id: String,
    #[serde(rename = "privilege_groups")]
    pub privilege_group_ids: Vec<String>
}

impl AssignPrivilegePayload {
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.external_person_id.trim().is_empty() {
            return Err(MessageError::missing("personId"));
        }
        if self.privilege_group_ids.is_empty() {
            return Err(MessageError::missing("privilege_groups"));
        }
        Ok(())
    }
}

/// Envelope placed on every stage queue.
///
/// On the wire: `{"stage": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "payload", rename_all = "snake_case")]
pub enum StageMessage {
    CreatePerson(EmployeeRecord),
    UpdateIdentifier(UpdateIdentifierPayload),
    AssignPrivilege(AssignPrivilegePayload)
}

impl StageMessage {
    pub fn stage(&self) -> Stage {
        match self {
            StageMessage::CreatePerson(_) => Stage::CreatePerson,
            StageMessage::UpdateIdentifier(_) => Stage::UpdateIdentifier,
            StageMessage::AssignPrivilege(_) => Stage::AssignPrivilege
        }
    }

    pub fn decode(body: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(body).map_err(|e| MessageError::decode("stage message", &e))
    }

    /// Decodes a body taken from the queue that belongs to `expected`.
    pub fn decode_for(expected: Stage, body: &[u8]) -> Result<Self, MessageError> {
        let message = Self::decode(body)?;
        if message.stage() != expected {
            return Err(MessageError::WrongStage {
                expected: expected.to_string(),
                found: message.stage().to_string()
            });
        }
        Ok(message)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Message carried by the ingestion queue: one HR page, or whatever the
/// trigger endpoint received, forwarded unmodified under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestMessage {
    pub event: String,
    pub data: Value
}

impl IngestMessage {
    pub const SYNC_EVENT: &'static str = "HIKVISION_SYNC";

    pub fn sync(data: Value) -> Self {
        Self {
            event: Self::SYNC_EVENT.to_string(),
            data
        }
    }
}

/// One page of the HR source listing, records still raw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<Value>,
    pub pagination: Pagination
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub last_page: u32,
    #[serde(default)]
    pub total: u64
}

impl Page {
    pub fn record_count(&self) -> usize {
        self.data.len()
    }
}

/// Static lookup from regional slug to privilege group id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneMapping(BTreeMap<String, String>);

impl Default for ZoneMapping {
    fn default() -> Self {
        Self::from_pairs([
            ("zona-i", "1"),
            ("zona-ii", "2"),
            ("zona-iii", "6"),
            ("zona-iv", "7"),
            ("tuks", "8"),
            ("kawasan", "9")
        ])
    }
}

impl ZoneMapping {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self(entries)
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(slug, group)| (slug.to_string(), group.to_string()))
                .collect()
        )
    }

    pub fn get(&self, slug: &str) -> Option<&str> {
        self.0.get(slug).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Privilege group ids for the given memberships, in membership order.
    /// Absent slugs and slugs missing from the table are skipped.
    pub fn privilege_groups_for(&self, regionals: &[Regional]) -> Vec<String> {
        regionals
            .iter()
            .filter_map(|regional| regional.slug.as_deref())
            .filter_map(|slug| self.get(slug))
            .map(str::to_string)
            .collect()
    }
}

/// Terminal outcome assigned to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Reject { requeue: bool }
}

impl Disposition {
    /// Reject without requeue: the message goes to the dead-letter path.
    pub const fn dead_letter() -> Self {
        Disposition::Reject { requeue: false }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Reject { requeue: false } => "reject",
            Disposition::Reject { requeue: true } => "requeue"
        }
    }
}

/// Opaque handle for one received message.
///
/// Deliberately neither `Clone` nor `Copy`: settling a delivery consumes its
/// tag, so a tag can receive at most one disposition.
#[derive(Debug, PartialEq, Eq)]
pub struct DeliveryTag(String);

impl DeliveryTag {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message handed to a consumer, awaiting its disposition.
#[derive(Debug)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub body: Vec<u8>,
    /// Set when the broker already delivered this message once without it
    /// being settled.
    pub redelivered: bool
}

/// A rejected message parked on a dead-letter queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: String,
    pub body: Vec<u8>,
    pub reason: Option<String>
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn jane() -> Value {
        json!({
            "name": "Jane",
            "identity_number": "123",
            "kib_number": "K1",
            "regionals": [{"slug": "zona-i", "name": "Zona I"}],
            "department": "Operations"
        })
    }

    #[test]
    fn test_employee_keeps_unknown_fields() {
        let record = EmployeeRecord::from_value(jane()).unwrap();
        assert_eq!(record.name, "Jane");
        assert_eq!(record.kib(), Some("K1"));
        assert_eq!(record.extra.get("department"), Some(&json!("Operations")));
        assert_eq!(
            record.regionals[0].extra.get("name"),
            Some(&json!("Zona I"))
        );

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["department"], "Operations");
        assert_eq!(back["regionals"][0]["name"], "Zona I");
        assert!(back.get("phone_number").is_none());
    }

    #[test]
    fn test_employee_missing_identity_is_malformed() {
        let err = EmployeeRecord::from_value(json!({"name": "Jane"})).unwrap_err();
        assert!(matches!(err, MessageError::Decode { .. }));

        let err =
            EmployeeRecord::from_value(json!({"name": "  ", "identity_number": "1"})).unwrap_err();
        assert!(matches!(err, MessageError::MissingField { ref field } if field == "name"));
    }

    #[test]
    fn test_null_regionals_decode_as_empty() {
        let record = EmployeeRecord::from_value(json!({
            "name": "Jane",
            "identity_number": "123",
            "regionals": null
        }))
        .unwrap();
        assert!(record.regionals.is_empty());
    }

    #[test]
    fn test_blank_kib_and_photo_are_absent() {
        let mut record = EmployeeRecord::new("Jane", "123");
        record.kib_number = Some("   ".to_string());
        record.photo = Some(Photo {
            link: Some(String::new()),
            extra: Map::new()
        });
        assert_eq!(record.kib(), None);
        assert_eq!(record.photo_link(), None);
    }

    #[test]
    fn test_stage_message_wire_format() {
        let message = StageMessage::AssignPrivilege(AssignPrivilegePayload {
            external_person_id: "P1".to_string(),
            privilege_group_ids: vec!["1".to_string()]
        });
        let value: Value = serde_json::from_slice(&message.to_bytes().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "stage": "assign_privilege",
                "payload": {"personId": "P1", "privilege_groups": ["1"]}
            })
        );
    }

    #[test]
    fn test_update_identifier_wire_format() {
        let body = json!({
            "stage": "update_identifier",
            "payload": {"personId": "P1", "kib_number": "K1", "employee": jane()}
        });
        let message =
            StageMessage::decode_for(Stage::UpdateIdentifier, body.to_string().as_bytes()).unwrap();
        match message {
            StageMessage::UpdateIdentifier(payload) => {
                assert_eq!(payload.external_person_id, "P1");
                assert_eq!(payload.kib_number, "K1");
                assert_eq!(payload.employee.identity_number, "123");
            }
            other => panic!("unexpected message {other:?}")
        }
    }

    #[test]
    fn test_decode_for_rejects_wrong_stage() {
        let body = StageMessage::CreatePerson(EmployeeRecord::new("Jane", "123"))
            .to_bytes()
            .unwrap();
        let err = StageMessage::decode_for(Stage::AssignPrivilege, &body).unwrap_err();
        assert!(matches!(err, MessageError::WrongStage { .. }));
    }

    #[test]
    fn test_zone_mapping_preserves_order_and_skips_unknown() {
        let mapping = ZoneMapping::default();
        let regionals = vec![
            Regional::new("kawasan"),
            Regional::new("unknown"),
            Regional::new("zona-i"),
            Regional::new("zona-iii")
        ];
        assert_eq!(
            mapping.privilege_groups_for(&regionals),
            vec!["9".to_string(), "1".to_string(), "6".to_string()]
        );
        assert!(mapping.privilege_groups_for(&[Regional::new("nope")]).is_empty());
    }

    #[test]
    fn test_null_slug_keeps_record_and_maps_to_nothing() {
        let record = EmployeeRecord::from_value(json!({
            "name": "Jane",
            "identity_number": "123",
            "regionals": [{"slug": null}, {"name": "no slug"}, {"slug": "zona-i"}]
        }))
        .unwrap();

        assert_eq!(record.regionals.len(), 3);
        assert_eq!(record.regionals[0].slug, None);
        assert_eq!(
            ZoneMapping::default().privilege_groups_for(&record.regionals),
            vec!["1".to_string()]
        );
    }

    #[test]
    fn test_zone_mapping_deserializes_from_table() {
        let mapping: ZoneMapping = serde_json::from_value(json!({"north": "11"})).unwrap();
        assert_eq!(mapping.get("north"), Some("11"));
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn test_page_decoding() {
        let page: Page = serde_json::from_value(json!({
            "data": [jane()],
            "pagination": {"current_page": 1, "last_page": 3, "total": 25}
        }))
        .unwrap();
        assert_eq!(page.record_count(), 1);
        assert_eq!(page.pagination.last_page, 3);

        let missing: Result<Page, _> = serde_json::from_value(json!({"data": []}));
        assert!(missing.is_err());
    }

    #[test]
    fn test_disposition_labels() {
        assert_eq!(Disposition::Ack.label(), "ack");
        assert_eq!(Disposition::dead_letter().label(), "reject");
        assert_eq!(Disposition::Reject { requeue: true }.label(), "requeue");
    }

    #[test]
    fn test_stage_chain() {
        assert_eq!(Stage::CreatePerson.next(), Some(Stage::UpdateIdentifier));
        assert_eq!(Stage::UpdateIdentifier.next(), Some(Stage::AssignPrivilege));
        assert_eq!(Stage::AssignPrivilege.next(), None);
    }
}
