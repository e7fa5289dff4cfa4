//! Client side of agentview: keeps a live mirror of the hub's tabs and turns
//! the active one into something printable.

pub mod api;
pub mod config;
pub mod driver;
pub mod history;
pub mod logging;
pub mod registry;
pub mod session;
pub mod term;
pub mod transport;
pub mod view;

pub use api::{ApiError, HttpTabApi, TabApi};
pub use driver::{Completion, Driver};
pub use history::ClosedTabHistory;
pub use registry::TabRegistry;
pub use session::{Command, Session};
pub use transport::{ReconnectPolicy, SessionTransport, TransportEvent};
pub use view::{render_tab, DiffView, RenderedTab};
