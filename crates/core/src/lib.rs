pub mod auth;
pub mod clock;
pub mod config;
pub mod confirmation;
pub mod domain;
pub mod errors;
pub mod policy;
pub mod realtime;
pub mod risk;

pub use auth::{TokenError, TokenSigner};
pub use clock::{Clock, ManualClock, SystemClock};
pub use confirmation::{requires_confirmation, AutoApproveMode};
pub use domain::action::{
    ActionId, ActionRequest, ActionType, PendingAction, PendingActionStatus, RiskLevel,
    TriggerContext, UserId, PENDING_ACTION_TTL_MINUTES,
};
pub use domain::history::{
    ActionFeedback, ActionHistoryRecord, FeedbackError, FeedbackInput, HistoryId, HistoryStatus,
};
pub use domain::settings::{TeamId, TeamPolicy, UserAgentSettings};
pub use errors::{ActionError, ApplicationError, DomainError, InterfaceError};
pub use policy::{check_policy, GatedCapability, PolicyDecision};
pub use realtime::{
    ChangeEvent, ChangeKind, ChangeNotifier, ClientMirror, MirrorState, MirrorSubscription,
    ResolutionResponse, UserEventReceiver,
};
pub use risk::classify;
