/// 根据 `-v` 次数初始化 env_logger：
/// 0 = warn, 1 = info, 2 = debug, 3+ = trace；`quiet` 只保留 error。
/// RUST_LOG 仍可覆盖单个模块的级别。
pub fn init(verbose: u8, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        level_for(verbose)
    };

    // 测试中可能重复初始化，忽略错误
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}

fn level_for(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}
