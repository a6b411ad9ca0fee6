use chrono::Local;
use env_logger::{Builder, Env, WriteStyle};
use log::Level;
use std::io::{IsTerminal, Write};

pub const LOG_ENV_VAR: &str = "IMU_HUB_LOG";

pub fn init_logger() {
    let colored = std::io::stderr().is_terminal();

    Builder::from_env(Env::new().filter_or(LOG_ENV_VAR, "info"))
        .write_style(WriteStyle::Never)
        .format(move |buf, record| {
            let time = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let (color, reset) = if colored {
                (level_color(record.level()), "\x1b[0m")
            } else {
                ("", "")
            };
            writeln!(
                buf,
                "{} {}{:<5}{} [{}] {}",
                time,
                color,
                record.level(),
                reset,
                record.target(),
                record.args(),
            )
        })
        .init();
}

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1b[31m\x1b[1m", // 红色
        Level::Warn => "\x1b[33m\x1b[1m",  // 黄色
        Level::Info => "\x1b[32m\x1b[1m",  // 绿色
        Level::Debug => "\x1b[36m\x1b[1m", // 青色
        Level::Trace => "\x1b[90m\x1b[1m", // 灰色
    }
}
