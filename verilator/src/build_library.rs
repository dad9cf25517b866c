// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

// hardcoded knowledge:
// - output library is obj_dir/libV${top_module}_dyn.so
// - verilated.h and verilated_vcd_c.h are on verilator's include path

use std::{fmt::Write, fs, process::Command, time::SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use snafu::{Whatever, prelude::*};

use crate::{PortDirection, PortSignature, VerilatedModelConfig, VerilatorRuntimeOptions};

fn build_ffi(
    artifact_directory: &Utf8Path,
    top: &str,
    ports: &[PortSignature<'_>],
    config: VerilatedModelConfig,
) -> Result<Utf8PathBuf, Whatever> {
    let ffi_wrappers = artifact_directory.join("ffi.cpp");

    let trace_include = if config.enable_tracing {
        "#include \"verilated_vcd_c.h\""
    } else {
        ""
    };
    let trace_ever_on = if config.enable_tracing {
        "Verilated::traceEverOn(true);"
    } else {
        ""
    };

    let mut buffer = String::new();
    writeln!(
        &mut buffer,
        r#"
#include "verilated.h"
{trace_include}
#include "V{top}.h"

extern "C" {{
    void* ffi_new_V{top}() {{
        {trace_ever_on}
        return new V{top}{{}};
    }}

    void ffi_V{top}_eval(V{top}* top) {{
        top->eval();
    }}

    void ffi_delete_V{top}(V{top}* top) {{
        top->final();
        delete top;
    }}
"#
    )
    .whatever_context("Failed to format utility FFI")?;

    if config.enable_tracing {
        writeln!(
            &mut buffer,
            r#"
    void* ffi_V{top}_open_trace(V{top}* top, const char* path) {{
        VerilatedVcdC* vcd = new VerilatedVcdC;
        top->trace(vcd, 99);
        vcd->open(path);
        return vcd;
    }}

    void ffi_VerilatedVcdC_dump(VerilatedVcdC* vcd, uint64_t timestamp) {{
        vcd->dump(timestamp);
    }}

    void ffi_VerilatedVcdC_flush(VerilatedVcdC* vcd) {{
        vcd->flush();
    }}

    void ffi_VerilatedVcdC_close_and_delete(VerilatedVcdC* vcd) {{
        vcd->close();
        delete vcd;
    }}
"#
        )
        .whatever_context("Failed to format tracing FFI")?;
    }

    for (port, msb, lsb, direction) in ports {
        let width = msb - lsb + 1;
        if width > 64 {
            let underlying = format!(
                "Port `{port}` on top module `{top}` was larger than 64 bits wide"
            );
            whatever!(
                Err(underlying),
                "We don't support larger than 64-bit width on ports yet because weird C linkage things"
            );
        }
        let macro_prefix = match direction {
            PortDirection::Input => "VL_IN",
            PortDirection::Output => "VL_OUT",
            PortDirection::Inout => "VL_INOUT",
        };
        let macro_suffix = if width <= 8 {
            "8"
        } else if width <= 16 {
            "16"
        } else if width <= 32 {
            ""
        } else {
            "64"
        };
        let type_macro = |name: Option<&str>| {
            format!(
                "{}{}({}, {}, {})",
                macro_prefix,
                macro_suffix,
                name.unwrap_or("/* return value */"),
                msb,
                lsb,
            )
        };

        if matches!(direction, PortDirection::Input | PortDirection::Inout) {
            let input_type = type_macro(Some("new_value"));
            writeln!(
                &mut buffer,
                r#"
    void ffi_V{top}_pin_{port}(V{top}* top, {input_type}) {{
        top->{port} = new_value;
    }}
            "#
            )
            .whatever_context("Failed to format input port FFI")?;
        }

        if matches!(direction, PortDirection::Output | PortDirection::Inout) {
            let return_type = type_macro(None);
            writeln!(
                &mut buffer,
                r#"
    {return_type} ffi_V{top}_read_{port}(V{top}* top) {{
        return top->{port};
    }}
            "#
            )
            .whatever_context("Failed to format output port FFI")?;
        }
    }

    writeln!(&mut buffer, "}} // extern \"C\"")
        .whatever_context("Failed to format ending brace")?;

    fs::write(&ffi_wrappers, buffer)
        .whatever_context("Failed to write FFI wrappers file")?;

    Ok(ffi_wrappers)
}

fn last_modified(path: &Utf8Path) -> Option<SystemTime> {
    fs::metadata(path)
        .ok()
        .filter(|metadata| metadata.is_file())
        .and_then(|metadata| metadata.modified().ok())
}

fn needs_rebuild(
    source_files: &[Utf8PathBuf],
    library_path: &Utf8Path,
) -> Result<bool, Whatever> {
    let Some(last_built) = last_modified(library_path) else {
        return Ok(true);
    };

    for source_file in source_files {
        let last_edited = fs::metadata(source_file)
            .whatever_context(format!(
                "Failed to read file metadata for source file {source_file}"
            ))?
            .modified()
            .whatever_context(format!(
                "Failed to determine last-modified time for source file {source_file}"
            ))?;
        if last_edited > last_built {
            return Ok(true);
        }
    }

    Ok(false)
}

#[allow(clippy::too_many_arguments)]
pub fn build_library(
    source_files: &[Utf8PathBuf],
    include_directories: &[Utf8PathBuf],
    top_module: &str,
    ports: &[PortSignature<'_>],
    artifact_directory: &Utf8Path,
    options: &VerilatorRuntimeOptions,
    config: VerilatedModelConfig,
) -> Result<Utf8PathBuf, Whatever> {
    let ffi_artifact_directory = artifact_directory.join("ffi");
    fs::create_dir_all(&ffi_artifact_directory).whatever_context(
        "Failed to create ffi subdirectory under artifacts directory",
    )?;
    let verilator_artifact_directory = artifact_directory.join("obj_dir");
    let library_name = format!("V{top_module}_dyn");
    let library_path =
        verilator_artifact_directory.join(format!("lib{library_name}.so"));

    if !options.force_verilator_rebuild
        && !needs_rebuild(source_files, &library_path)
            .whatever_context("Failed to check if artifacts need rebuilding")?
    {
        if options.log {
            log::info!("Reusing up-to-date library {}", library_path);
        }
        return Ok(library_path);
    }

    let _ffi_wrappers =
        build_ffi(&ffi_artifact_directory, top_module, ports, config)
            .whatever_context("Failed to build FFI wrappers")?;

    // bug in verilator#5226 means the directory must be relative to -Mdir
    let ffi_wrappers = Utf8Path::new("../ffi/ffi.cpp");

    let mut verilator_command = Command::new(&options.verilator_executable);
    verilator_command
        .args(["--cc", "-sv", "--build", "-j", "0"])
        .args(["-CFLAGS", "-shared -fpic"])
        .args(["--lib-create", &library_name])
        .args(["--Mdir", verilator_artifact_directory.as_str()])
        .args(["--top-module", top_module]);
    if config.enable_tracing {
        verilator_command.arg("--trace");
    }
    if let Some(level) = options.verilator_optimization {
        if level > 3 {
            whatever!("Verilator optimization level must be 0 to 3, got {}", level);
        }
        verilator_command.arg(format!("-O{level}"));
    }
    for warning in &options.ignored_warnings {
        verilator_command.arg(format!("-Wno-{warning}"));
    }
    for include_directory in include_directories {
        verilator_command.arg(format!("-I{include_directory}"));
    }
    verilator_command.args(source_files).arg(ffi_wrappers);

    if options.log {
        log::info!("Invoking {:?}", verilator_command);
    }
    let verilator_output = verilator_command
        .output()
        .whatever_context("Invocation of verilator failed")?;

    if !verilator_output.status.success() {
        whatever!(
            "Invocation of verilator failed with nonzero exit code {}\n\n--- STDOUT ---\n{}\n\n--- STDERR ---\n{}",
            verilator_output.status,
            String::from_utf8(verilator_output.stdout).unwrap_or_default(),
            String::from_utf8(verilator_output.stderr).unwrap_or_default()
        );
    }

    Ok(library_path)
}
