pub mod block_grid;
pub mod damage_area;
pub mod field_bank;
pub mod field_corrector;
pub mod neighborhood_classifier;
pub mod orientation;
pub mod quality_categorizer;
pub mod region_extractor;
pub mod singularity_tagger;
pub mod utils;
