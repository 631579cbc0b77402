use crate::api::handlers::auth::state::AuthConfig;

pub mod server;

pub enum Action {
    Server {
        port: u16,
        dsn: String,
        config: Box<AuthConfig>,
    },
}
