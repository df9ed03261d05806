pub mod users;

pub use users::{NewUser, User, UserId, UserInvitation, Version};
