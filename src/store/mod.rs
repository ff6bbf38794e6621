//! Element store, edge store and neighbor expander.
//!
//! Each submodule adds an `impl` block to [`Store`](crate::Store):
//!
//! | Module | Operations |
//! |--------|------------|
//! | `elements` | `save`, `exists`, `remove`, `find`, `find_one`, `find_recent`, `stats`, `clear` |
//! | `edges` | `connect`, `commit_edges`, `edge`, `edges_of` |
//! | `expand` | `expand_one`, `expand_many` |

mod elements;
mod edges;
mod expand;

pub use elements::Stats;
pub use expand::Neighborhood;
