// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]
// TODO: consider removing this later. It's not a bad lint but I don't want to deal with it now.
#![allow(clippy::too_many_arguments)]

pub mod helpers;
pub mod item_pool;
pub mod randomize;
pub mod settings;
pub mod spoiler_log;
pub mod super_fun;
pub mod traverse;
