pub mod assignment;
pub mod game;
pub mod user;

pub use assignment::{Assignment, AssignmentView, NewAssignment};
pub use game::{Game, GameFilter, NewGame, NewGameResult};
pub use user::{AdminProfile, LINKED_LOGIN_PREFIX, NewUser, StudentSummary, TeacherSummary, User, UserUpdate};
