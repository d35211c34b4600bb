#![allow(dead_code)]

use anyhow::Result;
use namada_core::download::{sha256_hex, VerifiedDownload};
use namada_core::Config;
use namada_hal::{success_output, FakeHal};
use namada_installer::cli::Cli;
use namada_installer::{execute, Runtime};
use std::io::Write;
use tempfile::NamedTempFile;

const RUSTUP_INIT: &[u8] = b"rustup-init binary";
const COMETBFT: &[u8] = b"cometbft tarball";

/// Config used by the CLI tests: no interactive password step.
pub const CONFIG: &str = "[operator]\nset_password = false\n";

pub fn config() -> Config {
    Config::from_toml(CONFIG).unwrap()
}

pub fn config_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    file
}

/// A fresh Ubuntu host whose external tools behave like the real ones would.
pub fn provisionable_host(config: &Config) -> FakeHal {
    let hal = FakeHal::ubuntu();
    hal.with_host(|h| h.add_executable("/usr/bin/tar"));

    let rustup = VerifiedDownload::rustup_init(&config.build_env.rustup_dist_server).unwrap();
    hal.serve_download(&rustup.url, RUSTUP_INIT.to_vec());
    hal.serve_download(
        &rustup.checksum_url,
        format!("{}  {}\n", sha256_hex(RUSTUP_INIT), rustup.file_name),
    );
    hal.on_command("/opt/namada-build/downloads/rustup-init", |_, host| {
        host.add_executable("/opt/namada-build/cargo/bin/cargo");
        host.add_executable("/opt/namada-build/cargo/bin/rustup");
        Ok(success_output(Vec::new()))
    });

    hal.on_command("/opt/namada-build/cargo/bin/cargo", |inv, host| {
        match inv.args.first().map(String::as_str) {
            Some("install") => host.add_executable("/opt/namada-build/cargo/bin/syd"),
            Some("build") => {
                for bin in ["namada", "namadan", "namadac", "namadaw"] {
                    host.add_executable(format!("/opt/namada-build/src/namada/target/release/{bin}"));
                }
            }
            _ => {}
        }
        Ok(success_output(Vec::new()))
    });

    let cometbft = VerifiedDownload::cometbft(&config.node.cometbft_version).unwrap();
    hal.serve_download(&cometbft.url, COMETBFT.to_vec());
    hal.serve_download(
        &cometbft.checksum_url,
        format!("{}  {}\n", sha256_hex(COMETBFT), cometbft.file_name),
    );
    hal.on_command("tar", |_, host| {
        host.add_executable("/opt/namada-build/downloads/cometbft");
        Ok(success_output(Vec::new()))
    });
    hal.on_command("/usr/local/bin/cometbft", |_, _| {
        Ok(success_output(b"0.37.15\n".to_vec()))
    });

    hal.on_command("git", |inv, host| {
        if inv.args.first().map(String::as_str) == Some("clone") {
            host.add_dir("/opt/namada-build/src/namada/.git");
            return Ok(success_output(Vec::new()));
        }
        Ok(success_output(b"v101.0.0\n".to_vec()))
    });
    for dir in ["/opt/namada-build/src/namada/target/release", "/usr/local/bin"] {
        hal.on_command(&format!("{dir}/namada"), |inv, host| {
            if inv.args.iter().any(|a| a == "join-network") {
                host.add_dir("/var/lib/namada/namada.5f5de2dd1b88cba30586420");
                return Ok(success_output(Vec::new()));
            }
            Ok(success_output(b"Namada v101.0.0\n".to_vec()))
        });
    }
    hal
}

/// Run the CLI against `hal`, answering any prompt with `answer`.
pub fn run_cli(
    hal: &FakeHal,
    args: &[&str],
    interactive: bool,
    answer: bool,
) -> (Result<()>, String) {
    let cli = <Cli as clap::Parser>::try_parse_from(args).unwrap();
    let confirm = move |_prompt: &str| -> Result<bool> { Ok(answer) };
    let runtime = Runtime {
        hal,
        interactive,
        confirm: &confirm,
    };
    let mut out = Vec::new();
    let result = execute(&cli, &runtime, &mut out);
    (result, String::from_utf8(out).unwrap())
}

pub fn config_arg(file: &NamedTempFile) -> String {
    file.path().display().to_string()
}
