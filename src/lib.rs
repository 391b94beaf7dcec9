//! HTTP Scenario Mock
//!
//! An interceptor that sits in front of an HTTP client and answers requests
//! from scenario files or callbacks instead of the network.
//!
//! # Modes
//!
//! - **Disabled**: every request goes to the live transport
//! - **Enabled**: only mocks are served; an unmatched request is an error
//! - **Mixed**: mocks first, live transport as fallback
//! - **Record**: live responses are served and written back as scenarios
//!
//! # Features
//!
//! - **Ordered Providers**: callbacks first, then one file-backed provider per filing policy
//! - **Request Matching**: method, path, headers, query params, and body
//! - **Dynamic Templates**: Handlebars templates over the intercepted request
//! - **Latency Simulation**: global delay, overridden per rule
//! - **Recording**: atomic scenario writes, optionally strict about failures
//!
//! # Example Scenario
//!
//! Stored as `users/42.json` under the default mirror-path filing policy:
//!
//! ```yaml
//! rules:
//!   - id: get-user
//!     request:
//!       method: [GET]
//!       path:
//!         type: template
//!         template: /users/{id}
//!     response:
//!       status: 200
//!       template: true
//!       body:
//!         type: json
//!         content:
//!           id: "{{path.id}}"
//!     delay:
//!       fixed_ms: 100
//! ```

pub mod config;
pub mod error;
pub mod filing;
pub mod http;
pub mod interceptor;
pub mod mapper;
pub mod matcher;
pub mod mode;
pub mod provider;
pub mod scenario;
pub mod store;
pub mod template;
pub mod writer;

pub use config::{InterceptorBuilder, InterceptorConfig, LogSettings};
pub use error::{ConfigError, InterceptError, RecordingError, TransportError};
pub use filing::{FilingKind, FilingPolicy, MethodPathPolicy, MirrorPathPolicy};
pub use http::{HttpRequest, HttpResponse, Transport};
pub use interceptor::{InterceptorStats, MockResponseInterceptor};
pub use mapper::{JsonMapper, Mapper, ScenarioFormat, YamlMapper};
pub use mode::Mode;
pub use provider::{DynamicMockProvider, RequestCallback, ScenarioProvider, StaticMockProvider};
pub use scenario::{ResponseDescriptor, ScenarioDescriptor};
pub use store::{FileSystemStore, MemoryStore, ScenarioLoader, ScenarioSink};
pub use writer::{RecordOutcome, RequestWriter};
