pub mod gtf;
pub mod id_map;
pub mod meta_info;
pub mod quant;
pub use gtf::TxStruct;
pub use id_map::IdMap;
pub use meta_info::MetaInfo;
pub use quant::QuantRecords;
