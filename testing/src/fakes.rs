use async_trait::async_trait;
use errors::{Upstream, UpstreamError};
use hcp_core::{AccessControl, CreatedPerson, EmployeeRecord, EmployeeSource, Page, PhotoSource};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A call made against [`RecordingAccessControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessCall {
    CreatePerson {
        person_code: String,
        name: String,
        face_data: String
    },
    UpdateIdentifier {
        person_id: String,
        kib_number: String
    },
    AssignPrivilegeGroups {
        person_id: String,
        privilege_group_ids: Vec<String>
    }
}

/// Access-control fake that records every call and answers from a script.
pub struct RecordingAccessControl {
    calls: Mutex<Vec<AccessCall>>,
    person_id: Mutex<Option<String>>,
    fail_create: Mutex<bool>,
    fail_update: Mutex<bool>,
    fail_assign: Mutex<bool>
}

impl Default for RecordingAccessControl {
    fn default() -> Self {
        Self::returning(Some("P1"))
    }
}

impl RecordingAccessControl {
    /// A fake whose create call reports `person_id`.
    pub fn returning(person_id: Option<&str>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            person_id: Mutex::new(person_id.map(str::to_string)),
            fail_create: Mutex::new(false),
            fail_update: Mutex::new(false),
            fail_assign: Mutex::new(false)
        }
    }

    pub fn fail_create(&self, fail: bool) {
        *self.fail_create.lock() = fail;
    }

    pub fn fail_update(&self, fail: bool) {
        *self.fail_update.lock() = fail;
    }

    pub fn fail_assign(&self, fail: bool) {
        *self.fail_assign.lock() = fail;
    }

    pub fn calls(&self) -> Vec<AccessCall> {
        self.calls.lock().clone()
    }

    fn rejected(operation: &str) -> UpstreamError {
        UpstreamError::Platform {
            upstream: Upstream::AccessControl,
            code: "1".to_string(),
            message: format!("{operation} refused by fake")
        }
    }
}

#[async_trait]
impl AccessControl for RecordingAccessControl {
    async fn create_person(
        &self,
        employee: &EmployeeRecord,
        face_data: &str
    ) -> Result<CreatedPerson, UpstreamError> {
        self.calls.lock().push(AccessCall::CreatePerson {
            person_code: employee.identity_number.clone(),
            name: employee.name.clone(),
            face_data: face_data.to_string()
        });
        if *self.fail_create.lock() {
            return Err(Self::rejected("create"));
        }
        Ok(CreatedPerson {
            person_id: self.person_id.lock().clone()
        })
    }

    async fn update_identifier(
        &self,
        person_id: &str,
        kib_number: &str
    ) -> Result<(), UpstreamError> {
        self.calls.lock().push(AccessCall::UpdateIdentifier {
            person_id: person_id.to_string(),
            kib_number: kib_number.to_string()
        });
        if *self.fail_update.lock() {
            return Err(Self::rejected("update"));
        }
        Ok(())
    }

    async fn assign_privilege_groups(
        &self,
        person_id: &str,
        privilege_group_ids: &[String]
    ) -> Result<(), UpstreamError> {
        self.calls.lock().push(AccessCall::AssignPrivilegeGroups {
            person_id: person_id.to_string(),
            privilege_group_ids: privilege_group_ids.to_vec()
        });
        if *self.fail_assign.lock() {
            return Err(Self::rejected("assign"));
        }
        Ok(())
    }
}

/// Photo store answering from a fixed URL table; unknown URLs fail.
#[derive(Default)]
pub struct StaticPhotoSource {
    photos: HashMap<String, String>,
    requested: Mutex<Vec<String>>
}

impl StaticPhotoSource {
    pub fn with_photo(mut self, url: &str, base64: &str) -> Self {
        self.photos.insert(url.to_string(), base64.to_string());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl PhotoSource for StaticPhotoSource {
    async fn fetch_base64(&self, url: &str) -> Result<String, UpstreamError> {
        self.requested.lock().push(url.to_string());
        self.photos
            .get(url)
            .cloned()
            .ok_or_else(|| UpstreamError::Status {
                upstream: Upstream::Photo,
                status: 404,
                body: String::new()
            })
    }
}

/// HR source serving prepared pages; pages listed in `failing` error out.
pub struct ScriptedEmployeeSource {
    pages: Vec<Page>,
    failing: Vec<u32>,
    requested: Mutex<Vec<(String, u32)>>
}

impl ScriptedEmployeeSource {
    /// `pages[0]` answers page 1, and so on.
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages,
            failing: Vec::new(),
            requested: Mutex::new(Vec::new())
        }
    }

    pub fn failing_on(mut self, page: u32) -> Self {
        self.failing.push(page);
        self
    }

    pub fn requested(&self) -> Vec<(String, u32)> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl EmployeeSource for ScriptedEmployeeSource {
    async fn fetch_page(&self, date: &str, page: u32) -> Result<Page, UpstreamError> {
        self.requested.lock().push((date.to_string(), page));

        if self.failing.contains(&page) {
            return Err(UpstreamError::Status {
                upstream: Upstream::HrSource,
                status: 500,
                body: "scripted failure".to_string()
            });
        }

        let index = page.checked_sub(1).map(|i| i as usize);
        index
            .and_then(|i| self.pages.get(i))
            .cloned()
            .ok_or_else(|| UpstreamError::Status {
                upstream: Upstream::HrSource,
                status: 404,
                body: format!("no page {page}")
            })
    }
}
