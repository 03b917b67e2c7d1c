//! WeeWX archive access.
//!
//! Read-only analytics over the station's SQLite `archive` table. The same
//! service backs the dashboard endpoints below and the tools the query agent
//! hands to the model.
//!
//! ## Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | `/` | Liveness banner |
//! | GET | `/api/status` | Archive health and record count |
//! | GET | `/api/current` | Latest reading |
//! | GET | `/api/temperature?start&end` | Temperature statistics |
//! | GET | `/api/rainfall?start&end` | Rainfall totals |
//! | GET | `/api/wind?min_speed&start&end` | Wind events over a threshold |
//! | GET | `/api/humidity?start&end` | Humidity statistics |
//! | GET | `/api/daily-rain?start&end` | Rain totals per day |
//! | GET | `/api/pressure?start&end` | Barometric trend |

pub mod dtos;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod workers;

pub use services::ArchiveService;
pub use workers::ArchiveWatcher;
