pub mod event;
pub mod payment;
pub mod state_machine;

pub use event::{EventType, PaymentEvent};
pub use payment::{
    Customer, MetadataValue, Payment, PaymentId, PaymentMethod, PaymentState,
};
pub use state_machine::StateMachine;
