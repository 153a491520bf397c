pub mod encapsulated;
pub mod states;
pub mod vbwt;

pub use encapsulated::{handle_allele_encapsulated_states, set_allele_ids};
pub use states::{SearchState, SearchStates, SiteState, TraversingLocus};
pub use vbwt::{process_read_char_search_states, search_read_backwards};
