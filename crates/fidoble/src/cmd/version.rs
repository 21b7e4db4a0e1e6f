use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize, Debug)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    profile: &'static str,
    features: Vec<&'static str>,
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("fidoble {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let out = VersionOutput {
        name: "fidoble",
        version: env!("CARGO_PKG_VERSION"),
        target: option_env!("FIDOBLE_BUILD_TARGET").unwrap_or("unknown"),
        profile: option_env!("FIDOBLE_BUILD_PROFILE").unwrap_or("unknown"),
        features: enabled_features(),
    };

    if let OutputFormat::Json = format {
        print_json(&out);
        return Ok(SUCCESS);
    }

    println!("name: {}", out.name);
    println!("version: {}", out.version);
    println!("target: {}", out.target);
    println!("profile: {}", out.profile);
    println!("features: {}", out.features.join(", "));
    Ok(SUCCESS)
}

fn enabled_features() -> Vec<&'static str> {
    let mut features = vec!["cli"];
    if cfg!(feature = "async") {
        features.push("async");
    }
    if cfg!(feature = "simulator") {
        features.push("simulator");
    }
    features
}
