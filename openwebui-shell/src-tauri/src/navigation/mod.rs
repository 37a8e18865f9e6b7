mod authorizer;
mod params;

pub use authorizer::{validate_url, AuthorizedUrl, NavigationDecision, NavigationPolicy};
pub use params::{sanitize_params, ParamRule, RECOGNIZED_KEYS};
