//! Request and response bodies of the access-control platform.

use config::PersonDefaults;
use hcp_core::EmployeeRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonRequest<'a> {
    pub person_code: &'a str,
    pub person_family_name: &'a str,
    pub person_given_name: &'a str,
    pub gender: u8,
    pub org_index_code: &'a str,
    pub remark: &'a str,
    pub phone_no: &'a str,
    pub email: &'a str,
    pub faces: Vec<Face<'a>>,
    pub begin_time: &'a str,
    pub end_time: &'a str
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Face<'a> {
    pub face_data: &'a str
}

impl<'a> CreatePersonRequest<'a> {
    /// `face_data` is sent even when empty; the platform accepts a person
    /// without a usable face.
    pub fn new(
        employee: &'a EmployeeRecord,
        face_data: &'a str,
        defaults: &'a PersonDefaults
    ) -> Self {
        Self {
            person_code: &employee.identity_number,
            person_family_name: &defaults.family_name,
            person_given_name: &employee.name,
            gender: defaults.gender,
            org_index_code: &defaults.org_index_code,
            remark: &defaults.remark,
            phone_no: employee.phone().unwrap_or(defaults.default_phone.as_str()),
            email: employee.email_address().unwrap_or(defaults.default_email.as_str()),
            faces: vec![Face { face_data }],
            begin_time: &defaults.begin_time,
            end_time: &defaults.end_time
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePersonRequest<'a> {
    pub person_id: &'a str,
    pub person_code: &'a str
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPersonsRequest<'a> {
    pub privilege_group_id: &'a str,
    #[serde(rename = "type")]
    pub kind: u8,
    pub list: Vec<PersonRef<'a>>
}

#[derive(Debug, Serialize)]
pub struct PersonRef<'a> {
    pub id: &'a str
}

impl<'a> AddPersonsRequest<'a> {
    /// Person-type membership (`type = 1`) for a single person.
    pub fn single(privilege_group_id: &'a str, person_id: &'a str) -> Self {
        Self {
            privilege_group_id,
            kind: 1,
            list: vec![PersonRef { id: person_id }]
        }
    }
}

/// Common envelope of every platform answer. All fields are optional; a
/// missing `code` counts as success.
#[derive(Debug, Default, Deserialize)]
pub struct PlatformResponse {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub msg: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, rename = "personId")]
    pub person_id: Option<Value>
}

impl PlatformResponse {
    /// The platform code as text, whether it was sent as a string or number.
    pub fn code(&self) -> Option<String> {
        self.code.as_ref().and_then(value_as_text)
    }

    /// The platform message as text; non-string messages are rendered as JSON.
    pub fn message(&self) -> Option<String> {
        self.msg.as_ref().and_then(value_as_text)
    }

    pub fn is_success(&self) -> bool {
        self.code().is_none_or(|code| code == "0")
    }

    /// Id of a created person: top-level `personId`, else a scalar `data`.
    pub fn created_person_id(&self) -> Option<String> {
        let candidate = self
            .person_id
            .as_ref()
            .and_then(value_as_id)
            .or_else(|| self.data.as_ref().and_then(value_as_id))?;
        let trimmed = candidate.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string())
    }
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None
    }
}
