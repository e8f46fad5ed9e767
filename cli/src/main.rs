/*
 * This file is a part of kvd
*/

//! `kvd-cli`: a one-shot command-line client (`spec.md` §6 "CLI
//! client"). Connects, sends exactly one request built from argv,
//! prints the single response in human-readable form, exits.
//!
//! Grounded on `examples/original_source/src/client.cpp`: connect,
//! write one request, read one response, close. The wire codec itself
//! is reused from the `kvd` library crate (`kvd::net::protocol`)
//! rather than re-implemented here, so the client and server can never
//! drift out of sync on framing.

use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::process;

use clap::Parser;

use kvd::net::protocol::{decode_value, encode_request, Value};
use kvd::util::error::ErrCode;

#[derive(Parser, Debug)]
#[command(author, version, about = "One-shot client for kvd", long_about = None)]
struct Cli {
    /// Server host to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,
    /// Server port to connect to.
    #[arg(long, default_value_t = 1234)]
    port: u16,
    /// Command name and arguments, e.g. `set foo bar`.
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

fn err_code_num(code: ErrCode) -> i32 {
    code as i32
}

/// Print one response value the way `spec.md` §6 describes the CLI's
/// human-readable output.
fn print_value(value: &Value) {
    match value {
        Value::Nil => println!("(nil)"),
        Value::Str(s) => println!("(str) {}", String::from_utf8_lossy(s)),
        Value::Int(n) => println!("(int) {n}"),
        Value::Dbl(d) => println!("(dbl) {d}"),
        Value::Err(code, msg) => println!("(err) {} {}", err_code_num(*code), msg),
        Value::Arr(items) => {
            println!("(arr) len={}", items.len());
            for item in items {
                print_value(item);
            }
            println!("(arr) end");
        }
    }
}

fn run(cli: &Cli) -> std::io::Result<()> {
    if cli.command.len() > libkvd::K_MAX_ARGS {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("command has more than {} arguments", libkvd::K_MAX_ARGS),
        ));
    }

    let addr = SocketAddr::new(cli.host, cli.port);
    let mut stream = TcpStream::connect(addr)?;

    let args: Vec<&[u8]> = cli.command.iter().map(|s| s.as_bytes()).collect();
    stream.write_all(&encode_request(&args))?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;

    let (value, _) = decode_value(&payload).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed response from server")
    })?;
    print_value(&value);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("kvd-cli: {e}");
        process::exit(1);
    }
}
