// Entity Models - Users and the credit cards they own
//
// A credit card number is the account reference of the reconciler: every
// card owns exactly one balance timeline.

pub mod card;
pub mod user;

pub use card::CreditCard;
pub use user::User;
