//! The ledger operations.
//!
//! Every engine call is a single [`crate::store::Ledger::transact`] unit:
//! it either commits all of its row and counter changes or none of them.
//! The engines are generic over the backend and hold no state of their own.

pub mod allocate;
pub mod reallocate;
pub mod register;
pub mod submit;

pub use allocate::allocate;
pub use reallocate::{Reallocation, ReallocateRequest, SerialMove, reallocate};
pub use register::{NewUser, PasswordPolicy, register};
pub use submit::{Submission, submit};
