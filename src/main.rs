use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toycc::backend::{Backend, CraneliftBackend};
use toycc::Compiler;

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let (source_path, object_path) = match args.as_slice() {
        [source] => (PathBuf::from(source), PathBuf::from("output.o")),
        [source, output] => (PathBuf::from(source), PathBuf::from(output)),
        _ => return Err(usage()),
    };

    let compiler = Compiler::new();
    let module = compiler
        .compile_file(&source_path)
        .map_err(|err| err.to_string())?;

    // The textual IR dump sits next to the object file.
    let ir_path = object_path.with_extension("ir");
    match write_output_file(&ir_path, module.to_string().as_bytes()) {
        Ok(()) => println!("wrote IR dump {}", ir_path.display()),
        // A failed artifact is reported but does not stop the other one.
        Err(err) => eprintln!("{}", err),
    }

    let backend = CraneliftBackend::new().map_err(|err| err.to_string())?;
    let object_bytes = backend
        .generate(&module)
        .map_err(|err| format!("object generation failed: {}", err))?;
    match write_output_file(&object_path, &object_bytes) {
        Ok(()) => println!("wrote object file {}", object_path.display()),
        Err(err) => eprintln!("{}", err),
    }

    Ok(())
}

fn write_output_file(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                format!(
                    "failed to create output directory '{}': {}",
                    parent.display(),
                    err
                )
            })?;
        }
    }

    fs::write(path, bytes)
        .map_err(|err| format!("failed to write output file '{}': {}", path.display(), err))
}

fn usage() -> String {
    "usage: toycc <source-file> [output-file]".to_string()
}
