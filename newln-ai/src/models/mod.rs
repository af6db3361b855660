//! Data models for materials, generated candidates and enriched items

pub mod candidate;
pub mod enriched;
pub mod material;

pub use candidate::{CandidateItem, PhraseCandidate, WordCandidate};
pub use enriched::{EnrichedItem, Importance, PhraseMeaning, WordMeaning};
pub use material::{
    count_words, ArtifactList, ArtifactListDetail, Material, MaterialDetail, MaterialUpdate,
    NewMaterial, StoredItem,
};
