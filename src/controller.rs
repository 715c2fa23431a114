//! One generation cycle: validate, encode, call the service, record.
//!
//! The cycle is split in three so a caller can release its hold on the
//! session while the network call is pending. `begin` is where the
//! single-in-flight rule is enforced.

use tracing::{error, info, instrument, warn};

use crate::encoder;
use crate::error::GenerateError;
use crate::history::{HistoryEntry, HistoryStore};
use crate::request::{self, GenerationRequest};
use crate::service::{CaptionedImage, GeneratedImage, GenerationService, ServiceRequest};
use crate::session::{Session, SessionStatus};

/// Moves the session into `Submitting` and returns the validated request.
///
/// A session already submitting is left untouched and `Busy` is returned. A
/// validation failure records the message and leaves the session idle.
pub fn begin(session: &mut Session) -> Result<GenerationRequest, GenerateError> {
    if session.is_submitting() {
        warn!("submit ignored: a generation is already in flight");
        return Err(GenerateError::Busy);
    }

    session.result = None;
    session.error = None;

    match request::build(session.mode, &session.uploads, &session.config) {
        Ok(request) => {
            session.status = SessionStatus::Submitting;
            Ok(request)
        }
        Err(e) => {
            session.status = SessionStatus::Idle;
            session.error = Some(e.to_string());
            Err(e.into())
        }
    }
}

/// Encodes every source image, then makes the one service call.
#[instrument(skip_all, fields(mode = ?request.mode, ratio = %request.resolved_aspect_ratio))]
pub async fn execute(
    request: &GenerationRequest,
    service: &dyn GenerationService,
) -> Result<GeneratedImage, GenerateError> {
    let mut images = Vec::with_capacity(request.sources.len());
    for source in &request.sources {
        let image = encoder::encode(&source.image).await?;
        images.push(CaptionedImage {
            caption: source.caption.to_string(),
            image,
        });
    }

    let image = service
        .generate(ServiceRequest {
            images,
            instruction_text: request.instruction.clone(),
        })
        .await?;
    Ok(image)
}

/// Records the outcome of `execute`. Success sets the current result and
/// prepends a history entry; failure only sets the error message.
pub async fn finish(
    session: &mut Session,
    history: &mut HistoryStore,
    request: &GenerationRequest,
    outcome: Result<GeneratedImage, GenerateError>,
) -> Result<String, GenerateError> {
    match outcome {
        Ok(image) => {
            let id = history
                .add(HistoryEntry::from_request(request, image.clone()))
                .await;
            session.result = Some(image);
            session.error = None;
            session.status = SessionStatus::Succeeded;
            info!(id = %id, "generation succeeded");
            Ok(id)
        }
        Err(e) => {
            error!(error = %e, "generation failed");
            session.result = None;
            session.error = Some(e.user_message());
            session.status = SessionStatus::Failed;
            Err(e)
        }
    }
}

/// Releases a session left in `Submitting` by a cycle that will never reach
/// `finish`. Any other state is left as is.
pub fn abandon(session: &mut Session) {
    if !session.is_submitting() {
        return;
    }
    warn!("generation abandoned before completion");
    session.result = None;
    session.error = Some(GenerateError::Abandoned.user_message());
    session.status = SessionStatus::Failed;
}

/// Runs a full cycle against one session. Returns the new history entry id.
pub async fn submit(
    session: &mut Session,
    history: &mut HistoryStore,
    service: &dyn GenerationService,
) -> Result<String, GenerateError> {
    let request = begin(session)?;
    let outcome = execute(&request, service).await;
    finish(session, history, &request, outcome).await
}
