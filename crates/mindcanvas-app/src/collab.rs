use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use mindcanvas_core::{ImportError, NodeId, Vec2};
use mindcanvas_events::telemetry::{CanvasCommand, CommandSpan};
use mindcanvas_events::{
    CanvasData, CollabEvent, CollaborationTransport, Event, JoinResponse, Participant, Presence,
    TransportError,
};
use crate::graph_size;
use mindcanvas_graph::Canvas;
use std::sync::Arc;

/// What happened to one incoming collaboration event.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// A remote snapshot replaced the local graph.
    Applied,
    /// The remote snapshot matched the local graph.
    Unchanged,
    /// Echo of our own update.
    IgnoredOwn,
    /// Older than an update already applied.
    IgnoredStale,
    Rejected(ImportError),
    PresenceUpdated,
    ParticipantLeft(String),
}

/// Membership in one shared canvas.
///
/// Merging is whole-snapshot last-writer-wins keyed on the transport timestamp.
pub struct CollabSession {
    transport: Arc<dyn CollaborationTransport>,
    canvas_id: String,
    user_id: String,
    user_name: String,
    participants: Vec<Participant>,
    presence: Vec<Presence>,
    updates: Receiver<CollabEvent>,
    last_applied: Option<DateTime<Utc>>,
}

impl CollabSession {
    /// Open a new shared canvas seeded with `initial` and join it.
    pub fn create(
        transport: Arc<dyn CollaborationTransport>,
        name: &str,
        user_name: &str,
        initial: CanvasData,
    ) -> Result<(Self, JoinResponse), TransportError> {
        let canvas_id = transport.create(name, initial)?;
        Self::join(transport, &canvas_id, user_name)
    }

    pub fn join(
        transport: Arc<dyn CollaborationTransport>,
        canvas_id: &str,
        user_name: &str,
    ) -> Result<(Self, JoinResponse), TransportError> {
        let updates = transport.subscribe(canvas_id)?;
        let response = transport.join(canvas_id, user_name)?;
        tracing::info!(
            "Joined shared canvas {} as {} ({} participant(s))",
            response.canvas_id,
            response.user_id,
            response.participants.len()
        );
        let session = Self {
            transport,
            canvas_id: response.canvas_id.clone(),
            user_id: response.user_id.clone(),
            user_name: user_name.to_string(),
            participants: response.participants.clone(),
            presence: Vec::new(),
            updates,
            last_applied: None,
        };
        Ok((session, response))
    }

    pub fn canvas_id(&self) -> &str {
        &self.canvas_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Presence of the other participants.
    pub fn presence(&self) -> &[Presence] {
        &self.presence
    }

    /// Send a local commit to the other participants.
    pub fn publish(&self, data: CanvasData) -> Result<(), TransportError> {
        self.transport
            .update_data(&self.canvas_id, &self.user_id, data)
    }

    pub fn update_presence(
        &self,
        cursor: Option<Vec2>,
        selected: Vec<NodeId>,
    ) -> Result<(), TransportError> {
        self.transport.update_presence(
            &self.canvas_id,
            Presence {
                user_id: self.user_id.clone(),
                user_name: self.user_name.clone(),
                cursor,
                selected,
            },
        )
    }

    pub fn leave(self) -> Result<(), TransportError> {
        tracing::info!("Leaving shared canvas {}", self.canvas_id);
        self.transport.leave(&self.canvas_id, &self.user_id)
    }

    /// Apply every queued event to `canvas`, in arrival order.
    pub fn pump(&mut self, canvas: &mut Canvas) -> Vec<MergeOutcome> {
        let pending: Vec<CollabEvent> = self.updates.try_iter().collect();
        pending
            .into_iter()
            .map(|event| self.apply_event(canvas, event))
            .collect()
    }

    pub fn apply_event(&mut self, canvas: &mut Canvas, event: CollabEvent) -> MergeOutcome {
        match event {
            CollabEvent::CanvasUpdate {
                data,
                updated_by,
                timestamp,
            } => self.merge_update(canvas, data, updated_by, timestamp),
            CollabEvent::PresenceUpdate { presence } => {
                for entry in &presence {
                    if !self.participants.iter().any(|p| p.user_id == entry.user_id) {
                        self.participants.push(Participant {
                            user_id: entry.user_id.clone(),
                            user_name: entry.user_name.clone(),
                        });
                    }
                }
                self.presence = presence
                    .into_iter()
                    .filter(|p| p.user_id != self.user_id)
                    .collect();
                MergeOutcome::PresenceUpdated
            }
            CollabEvent::UserLeft { user_id } => {
                self.participants.retain(|p| p.user_id != user_id);
                self.presence.retain(|p| p.user_id != user_id);
                tracing::info!("Participant {} left {}", user_id, self.canvas_id);
                canvas.events().publish(Event::ParticipantLeft {
                    user_id: user_id.clone(),
                });
                MergeOutcome::ParticipantLeft(user_id)
            }
        }
    }

    fn merge_update(
        &mut self,
        canvas: &mut Canvas,
        data: CanvasData,
        updated_by: String,
        timestamp: DateTime<Utc>,
    ) -> MergeOutcome {
        if updated_by == self.user_id {
            return MergeOutcome::IgnoredOwn;
        }
        if let Some(last) = self.last_applied
            && timestamp < last
        {
            tracing::debug!(
                "Ignoring stale update from {} ({} < {})",
                updated_by,
                timestamp,
                last
            );
            return MergeOutcome::IgnoredStale;
        }

        let command = CommandSpan::start(CanvasCommand::RemoteMerge, graph_size(canvas.graph()));
        command.note(&updated_by);

        match canvas.apply_canvas_data(data) {
            Ok(changed) => {
                self.last_applied = Some(timestamp);
                command.succeed(graph_size(canvas.graph()));
                if changed {
                    canvas
                        .events()
                        .publish(Event::RemoteUpdateApplied { updated_by });
                    MergeOutcome::Applied
                } else {
                    MergeOutcome::Unchanged
                }
            }
            Err(err) => {
                tracing::warn!("Rejected update from {}: {}", updated_by, err);
                command.fail(&err.to_string());
                canvas.events().publish(Event::RemoteUpdateRejected {
                    updated_by,
                    reason: err.to_string(),
                });
                MergeOutcome::Rejected(err)
            }
        }
    }
}
