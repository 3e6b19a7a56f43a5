pub mod authorization_service;
pub mod normalize;

pub use authorization_service::AuthorizationService;
