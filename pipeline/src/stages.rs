//! The three chained stage handlers.
//!
//! Each handler turns one delivery into one external side effect and, on
//! success, at most one message for the next stage. The message is only
//! published after the side effect was confirmed.

use async_trait::async_trait;
use errors::{HandlerError, MessageError, TransportError};
use hcp_core::{
    AccessControl, AssignPrivilegePayload, CreatedPerson, Disposition, EmployeeRecord,
    MessagePublisher, PhotoSource, Stage, StageMessage, UpdateIdentifierPayload, ZoneMapping
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One consumer's message handler.
///
/// Handler-level failures (malformed payload, upstream refusal) come back
/// as `Ok(Disposition::Reject { requeue: false })`. An `Err` means the
/// broker failed while publishing downstream; the delivery must then be
/// left unsettled so it is redelivered.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Label used for logs and metrics.
    fn name(&self) -> &'static str;

    async fn handle(&self, body: &[u8]) -> Result<Disposition, TransportError>;
}

/// Publishes the next-stage message (if any) and maps the handler result
/// onto a disposition.
async fn conclude(
    stage: Stage,
    publisher: &dyn MessagePublisher,
    next_queue: &str,
    outcome: Result<Option<StageMessage>, HandlerError>
) -> Result<Disposition, TransportError> {
    let next = match outcome {
        Ok(next) => next,
        Err(e) => {
            warn!(stage = %stage, kind = e.kind(), error = %e, "Message rejected");
            return Ok(Disposition::dead_letter());
        }
    };

    let Some(message) = next else {
        return Ok(Disposition::Ack);
    };

    let body = match message.to_bytes() {
        Ok(body) => body,
        Err(e) => {
            warn!(stage = %stage, error = %e, "Cannot encode next-stage message");
            return Ok(Disposition::dead_letter());
        }
    };

    publisher.publish(next_queue, &body).await?;
    info!(
        stage = %stage,
        next_stage = %message.stage(),
        queue = %next_queue,
        "Forwarded to next stage"
    );
    Ok(Disposition::Ack)
}

/// Fetches the face photo when the record carries a link. Never fails:
/// a missing or unreachable photo yields an empty face payload.
pub(crate) async fn face_data(photos: &dyn PhotoSource, employee: &EmployeeRecord) -> String {
    let Some(link) = employee.photo_link() else {
        return String::new();
    };

    match photos.fetch_base64(link).await {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!(
                person_code = %employee.identity_number,
                url = %link,
                error = %e,
                "Photo unavailable, creating person without face"
            );
            String::new()
        }
    }
}

/// Creates the person, embedding the face photo when one can be fetched.
pub(crate) async fn create_person(
    access: &dyn AccessControl,
    photos: &dyn PhotoSource,
    employee: &EmployeeRecord
) -> Result<CreatedPerson, HandlerError> {
    employee.validate()?;
    let face = face_data(photos, employee).await;
    Ok(access.create_person(employee, &face).await?)
}

fn wrong_stage(expected: Stage, found: &StageMessage) -> HandlerError {
    MessageError::WrongStage {
        expected: expected.to_string(),
        found: found.stage().to_string()
    }
    .into()
}

pub struct CreatePersonHandler {
    access: Arc<dyn AccessControl>,
    photos: Arc<dyn PhotoSource>,
    publisher: Box<dyn MessagePublisher>,
    next_queue: String
}

impl CreatePersonHandler {
    pub fn new(
        access: Arc<dyn AccessControl>,
        photos: Arc<dyn PhotoSource>,
        publisher: Box<dyn MessagePublisher>,
        next_queue: impl Into<String>
    ) -> Self {
        Self {
            access,
            photos,
            publisher,
            next_queue: next_queue.into()
        }
    }

    async fn process(&self, body: &[u8]) -> Result<Option<StageMessage>, HandlerError> {
        let employee = match StageMessage::decode_for(Stage::CreatePerson, body)? {
            StageMessage::CreatePerson(employee) => employee,
            other => return Err(wrong_stage(Stage::CreatePerson, &other))
        };

        debug!(person_code = %employee.identity_number, name = %employee.name, "Creating person");
        let created = create_person(self.access.as_ref(), self.photos.as_ref(), &employee).await?;

        let person_id = created
            .person_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        match (person_id, employee.kib()) {
            (Some(person_id), Some(kib)) => Ok(Some(StageMessage::UpdateIdentifier(
                UpdateIdentifierPayload {
                    external_person_id: person_id.to_string(),
                    kib_number: kib.to_string(),
                    employee: employee.clone()
                }
            ))),
            (person_id, kib) => {
                info!(
                    person_code = %employee.identity_number,
                    has_person_id = person_id.is_some(),
                    has_kib = kib.is_some(),
                    "Person created, identifier update skipped"
                );
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl StageHandler for CreatePersonHandler {
    fn name(&self) -> &'static str {
        Stage::CreatePerson.as_str()
    }

    async fn handle(&self, body: &[u8]) -> Result<Disposition, TransportError> {
        let outcome = self.process(body).await;
        conclude(
            Stage::CreatePerson,
            self.publisher.as_ref(),
            &self.next_queue,
            outcome
        )
        .await
    }
}

pub struct UpdateIdentifierHandler {
    access: Arc<dyn AccessControl>,
    zones: Arc<ZoneMapping>,
    publisher: Box<dyn MessagePublisher>,
    next_queue: String
}

impl UpdateIdentifierHandler {
    pub fn new(
        access: Arc<dyn AccessControl>,
        zones: Arc<ZoneMapping>,
        publisher: Box<dyn MessagePublisher>,
        next_queue: impl Into<String>
    ) -> Self {
        Self {
            access,
            zones,
            publisher,
            next_queue: next_queue.into()
        }
    }

    async fn process(&self, body: &[u8]) -> Result<Option<StageMessage>, HandlerError> {
        let payload = match StageMessage::decode_for(Stage::UpdateIdentifier, body)? {
            StageMessage::UpdateIdentifier(payload) => payload,
            other => return Err(wrong_stage(Stage::UpdateIdentifier, &other))
        };
        payload.validate()?;

        self.access
            .update_identifier(&payload.external_person_id, &payload.kib_number)
            .await?;

        let groups = self
            .zones
            .privilege_groups_for(&payload.employee.regionals);
        if groups.is_empty() {
            info!(
                person_id = %payload.external_person_id,
                regionals = payload.employee.regionals.len(),
                "No mapped zone, privilege assignment skipped"
            );
            return Ok(None);
        }

        Ok(Some(StageMessage::AssignPrivilege(AssignPrivilegePayload {
            external_person_id: payload.external_person_id,
            privilege_group_ids: groups
        })))
    }
}

#[async_trait]
impl StageHandler for UpdateIdentifierHandler {
    fn name(&self) -> &'static str {
        Stage::UpdateIdentifier.as_str()
    }

    async fn handle(&self, body: &[u8]) -> Result<Disposition, TransportError> {
        let outcome = self.process(body).await;
        conclude(
            Stage::UpdateIdentifier,
            self.publisher.as_ref(),
            &self.next_queue,
            outcome
        )
        .await
    }
}

/// Terminal stage: nothing is published afterwards.
pub struct AssignPrivilegeHandler {
    access: Arc<dyn AccessControl>
}

impl AssignPrivilegeHandler {
    pub fn new(access: Arc<dyn AccessControl>) -> Self {
        Self { access }
    }

    async fn process(&self, body: &[u8]) -> Result<(), HandlerError> {
        let payload = match StageMessage::decode_for(Stage::AssignPrivilege, body)? {
            StageMessage::AssignPrivilege(payload) => payload,
            other => return Err(wrong_stage(Stage::AssignPrivilege, &other))
        };
        payload.validate()?;

        self.access
            .assign_privilege_groups(&payload.external_person_id, &payload.privilege_group_ids)
            .await?;

        info!(
            person_id = %payload.external_person_id,
            groups = ?payload.privilege_group_ids,
            "Privilege groups assigned, person fully synced"
        );
        Ok(())
    }
}

#[async_trait]
impl StageHandler for AssignPrivilegeHandler {
    fn name(&self) -> &'static str {
        Stage::AssignPrivilege.as_str()
    }

    async fn handle(&self, body: &[u8]) -> Result<Disposition, TransportError> {
        match self.process(body).await {
            Ok(()) => Ok(Disposition::Ack),
            Err(e) => {
                warn!(
                    stage = %Stage::AssignPrivilege,
                    kind = e.kind(),
                    error = %e,
                    "Message rejected"
                );
                Ok(Disposition::dead_letter())
            }
        }
    }
}
