use std::path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use env_logger;
use log;

use line_ext_sort::{ExternalSorter, ExternalSorterBuilder};

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let interrupt = Arc::new(AtomicBool::new(false));

    let sorter: ExternalSorter = ExternalSorterBuilder::new()
        .with_tmp_dir(path::Path::new("./"))
        .with_max_lines(100_000)
        .with_rw_buf_size(64 * 1024)
        .with_interrupt(interrupt.clone())
        .build()
        .unwrap();

    let summary = sorter
        .sort_file(path::Path::new("input.txt"), path::Path::new("output.txt"))
        .unwrap();

    log::info!("{} lines sorted using {} chunks", summary.records, summary.chunks);
}
