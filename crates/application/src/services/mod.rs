mod account_service;
mod history;


pub use account_service::{
    AccountService, AccountServiceDependencies, AuthorizeUserRequest, CreateMessageRequest,
    RegisterUserRequest, DEFAULT_HISTORY_LIMIT, MIN_PASSWORD_LENGTH,
};
pub use history::merge_history;
