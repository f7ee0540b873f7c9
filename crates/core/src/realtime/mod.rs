//! Change feed for pending actions and history, plus the client-side mirror
//! that consumes it.

pub mod mirror;
pub mod notifier;

pub use mirror::{ClientMirror, MirrorState, MirrorSubscription, ResolutionResponse};
pub use notifier::{ChangeEvent, ChangeKind, ChangeNotifier, UserEventReceiver};
