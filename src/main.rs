use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use line_ext_sort::{ExternalSorter, ExternalSorterBuilder, DEFAULT_MAX_LINES};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = variant_of(&arg_parser, "log_level");
    init_logger(log_level);

    let order: Order = variant_of(&arg_parser, "sort");
    let max_lines: usize = arg_parser.value_of_t_or_exit("max_lines");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let rw_buf_size: Option<&str> = arg_parser.value_of("rw_buf_size");

    let input = arg_parser.value_of("input").expect("value is required");
    let output = arg_parser.value_of("output").expect("value is required");

    let mut sorter_builder = ExternalSorterBuilder::new().with_max_lines(max_lines);

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    if let Some(rw_buf_size) = rw_buf_size {
        let rw_buf_size = rw_buf_size.parse::<ByteSize>().expect("value is pre-validated").as_u64();
        sorter_builder = sorter_builder.with_rw_buf_size(rw_buf_size as usize);
    }

    let sorter: ExternalSorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let input = path::Path::new(input);
    let output = path::Path::new(output);
    let result = match order {
        Order::Asc => sorter.sort_file(input, output),
        Order::Desc => sorter.sort_file_by(input, output, |a, b| a.cmp(b).reverse()),
    };

    let summary = match result {
        Ok(summary) => summary,
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    };

    for (path, err) in &summary.cleanup_failures {
        log::warn!("temporary file {} left on disk: {}", path.display(), err);
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
}

/// Lists the accepted names of an argument enum.
fn variant_names<'a, E: ArgEnum + 'a>() -> impl Iterator<Item = clap::PossibleValue<'a>> {
    E::value_variants().iter().filter_map(|v| v.to_possible_value())
}

/// Reads an argument enum value, the value is validated by the parser against [`variant_names`].
fn variant_of<E: ArgEnum>(arg_matches: &clap::ArgMatches, name: &str) -> E {
    let value = arg_matches.value_of(name).expect("value has a default");

    E::from_str(value, false).expect("value is pre-validated")
}

fn build_arg_parser() -> clap::ArgMatches {
    let default_max_lines = DEFAULT_MAX_LINES.to_string();

    let arg_matches = clap::App::new("line-ext-sort")
        .about("external sorter for newline-delimited text files")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("sort")
                .short('s')
                .long("sort")
                .help("sorting order")
                .takes_value(true)
                .default_value("asc")
                .possible_values(variant_names::<Order>()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(variant_names::<LogLevel>()),
        )
        .arg(
            clap::Arg::new("max_lines")
                .short('n')
                .long("max-lines")
                .help("maximum number of lines per chunk")
                .takes_value(true)
                .default_value(&default_max_lines)
                .validator(|v| match v.parse::<usize>() {
                    Ok(0) => Err("Maximum number of lines must be positive".to_string()),
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Maximum number of lines format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store chunk files, defaults to the input file directory")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("rw_buf_size")
                .short('b')
                .long("rw-buf-size")
                .help("files read/write buffer size")
                .takes_value(true)
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(size) if size.as_u64() == 0 => Err("Buffer size must be positive".to_string()),
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Buffer size format incorrect: {}", err)),
                }),
        )
        .get_matches();

    return arg_matches;
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
