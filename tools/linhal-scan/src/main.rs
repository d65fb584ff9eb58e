//! Probe an I2C bus for responding peripherals.
//!
//! Issues a one-byte read at every address in the standard probe range and
//! prints an address grid in the style of i2cdetect: `--` for silence, the
//! address for an acknowledge.

use anyhow::{Context, Result};
use linhal::hw_trait::I2c as _;
use linhal::i2c::I2c;

/// 7-bit addresses worth probing; below 0x08 and above 0x77 are reserved.
const FIRST_ADDRESS: u8 = 0x08;
const LAST_ADDRESS: u8 = 0x77;

fn main() -> Result<()> {
    linhal::tracing::init_journald_or_stdout();

    let path = std::env::args()
        .nth(1)
        .context("usage: linhal-scan <i2c-device>")?;
    let mut bus = I2c::open(&path).with_context(|| format!("opening {path}"))?;

    println!("     0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f");
    let mut found = 0;
    for row in (0x00..=0x70).step_by(0x10) {
        print!("{row:02x}:");
        for column in 0x0..=0xf {
            let address = row + column;
            if !(FIRST_ADDRESS..=LAST_ADDRESS).contains(&address) {
                print!("   ");
                continue;
            }
            let mut probe = [0u8; 1];
            match bus.read(address, &mut probe) {
                Ok(()) => {
                    found += 1;
                    print!(" {address:02x}");
                }
                Err(_) => print!(" --"),
            }
        }
        println!();
    }
    println!("{found} device(s) responded on {path}");
    Ok(())
}
