//! workerd-fuzz core library: the HTMLRewriter surface model, snippet
//! generation, crash classification and corpus tooling used by the CLI.

#[path = "runtime/builder.rs"]
mod builder;
#[path = "platform/config.rs"]
mod config;
#[path = "cmd/corpus.rs"]
mod corpus;
#[path = "modes/crash.rs"]
mod crash;
#[path = "model/decisions.rs"]
mod decisions;
#[path = "platform/duration.rs"]
mod duration;
#[path = "runtime/entropy.rs"]
mod entropy;
#[path = "platform/envinfo.rs"]
mod envinfo;
#[path = "platform/error.rs"]
mod error;
#[path = "platform/fsutil.rs"]
mod fsutil;
#[path = "cmd/generate.rs"]
mod generate;
#[path = "runtime/generic.rs"]
mod generic;
#[path = "model/groups.rs"]
mod groups;
#[path = "model/profile.rs"]
mod profile;
#[path = "model/reporting.rs"]
mod reporting;
#[path = "modes/scenario.rs"]
mod scenario;
#[path = "modes/snippets.rs"]
mod snippets;
#[path = "model/types.rs"]
mod types;
#[path = "cmd/usage.rs"]
mod usage;
#[path = "model/workerd.rs"]
mod workerd;

pub use builder::*;
pub use config::*;
pub use corpus::*;
pub use crash::*;
pub use decisions::*;
pub use duration::*;
pub use entropy::*;
pub use envinfo::*;
pub use error::*;
pub use fsutil::*;
pub use generate::*;
pub use generic::*;
pub use groups::*;
pub use profile::*;
pub use reporting::*;
pub use scenario::*;
pub use snippets::*;
pub use types::*;
pub use usage::*;
pub use workerd::*;
