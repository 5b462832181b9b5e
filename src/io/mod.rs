pub mod debug;
pub mod dot;
pub mod fasta;
pub mod graphviz;
pub mod tsv;
