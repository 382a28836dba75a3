use crate::protocol::{decode_server_frame, FrameError, FrameKind, Inbound, DEFAULT_MAX_FRAME_BYTES};
use crate::ProjectState;

/// What became of one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Applied(FrameKind),
    /// Liveness acknowledgement; belongs to the heartbeat path.
    Pong,
    Unknown(String),
    Malformed(FrameError),
}

impl Dispatch {
    pub fn mutated(&self) -> bool {
        matches!(self, Dispatch::Applied(_))
    }
}

/// Parses `raw` and routes it into `state`. Never fails: frames that cannot
/// be applied are classified and handed back for the caller to log.
pub fn dispatch(state: &mut ProjectState, raw: &str) -> Dispatch {
    dispatch_with_limit(state, raw, DEFAULT_MAX_FRAME_BYTES)
}

pub fn dispatch_with_limit(state: &mut ProjectState, raw: &str, max_frame_bytes: usize) -> Dispatch {
    match decode_server_frame(raw, max_frame_bytes) {
        Ok(Inbound::Known(frame)) => {
            let kind = frame.kind();
            if state.apply_frame(frame) {
                Dispatch::Applied(kind)
            } else {
                Dispatch::Pong
            }
        }
        Ok(Inbound::Unknown { kind }) => Dispatch::Unknown(kind),
        Err(err) => Dispatch::Malformed(err),
    }
}
