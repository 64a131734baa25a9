//! HD44780 character LCD behind a PCF8574 I2C backpack.
//!
//! The backpack maps its 8 output bits to the LCD as
//! `P0=RS P1=RW P2=EN P3=backlight P4..P7=D4..D7`, so the controller is
//! driven in 4-bit mode one nibble per I2C byte.

use kiosk_core::{DisplayError, TextDisplay};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::time::Duration;
use thiserror::Error;

/// `I2C_SLAVE` from `<linux/i2c-dev.h>`: select the target address for plain read/write.
const I2C_SLAVE: libc::c_ulong = 0x0703;

const RS: u8 = 0x01;
const EN: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE_LTR: u8 = 0x06;
const CMD_DISPLAY_ON: u8 = 0x0C;
const CMD_FUNCTION_4BIT_2LINE: u8 = 0x28;
const CMD_SET_DDRAM: u8 = 0x80;

const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

#[derive(Debug, Error)]
pub enum LcdError {
    #[error("failed to open I2C bus {bus}: {source}")]
    Open { bus: String, source: std::io::Error },
    #[error("failed to select I2C address {addr:#04x}: {source}")]
    Address { addr: u16, source: std::io::Error },
    #[error("I2C write failed: {0}")]
    Write(#[from] std::io::Error),
}

impl From<LcdError> for DisplayError {
    fn from(err: LcdError) -> Self {
        match err {
            LcdError::Write(e) => DisplayError::Io(e),
            other => DisplayError::Bus(other.to_string()),
        }
    }
}

/// Byte-wide output port of the I2C expander.
pub trait ExpanderPort: Send {
    fn write_byte(&mut self, byte: u8) -> std::io::Result<()>;
}

/// `/dev/i2c-N` with a selected slave address.
pub struct I2cPort {
    file: std::fs::File,
}

impl I2cPort {
    pub fn open(bus: &str, addr: u16) -> Result<Self, LcdError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(bus)
            .map_err(|source| LcdError::Open {
                bus: bus.to_string(),
                source,
            })?;

        // SAFETY: fd is valid for the lifetime of `file`; I2C_SLAVE takes the
        // address by value, no pointers are passed.
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE, libc::c_ulong::from(addr)) };
        if ret < 0 {
            return Err(LcdError::Address {
                addr,
                source: std::io::Error::last_os_error(),
            });
        }

        Ok(Self { file })
    }
}

impl ExpanderPort for I2cPort {
    fn write_byte(&mut self, byte: u8) -> std::io::Result<()> {
        self.file.write_all(&[byte])
    }
}

/// The LCD as wired on the kiosk.
pub type I2cLcd = CharLcd<I2cPort>;

/// Character LCD driver.
pub struct CharLcd<P: ExpanderPort> {
    port: P,
    columns: usize,
    rows: usize,
}

impl CharLcd<I2cPort> {
    /// Open the LCD on `bus` at `addr` and run the 4-bit init sequence.
    pub fn open(bus: &str, addr: u16, columns: usize, rows: usize) -> Result<Self, LcdError> {
        let lcd = Self::init(I2cPort::open(bus, addr)?, columns, rows)?;
        tracing::info!(bus, addr = %format!("{addr:#04x}"), columns, rows, "LCD ready");
        Ok(lcd)
    }
}

impl<P: ExpanderPort> CharLcd<P> {
    pub fn init(port: P, columns: usize, rows: usize) -> Result<Self, LcdError> {
        let mut lcd = Self {
            port,
            columns,
            rows: rows.clamp(1, ROW_OFFSETS.len()),
        };

        // Power-on: force 8-bit mode three times, then switch to 4-bit.
        std::thread::sleep(Duration::from_millis(50));
        for wait_us in [4500, 4500, 150] {
            lcd.pulse(0x30)?;
            std::thread::sleep(Duration::from_micros(wait_us));
        }
        lcd.pulse(0x20)?;

        lcd.command(CMD_FUNCTION_4BIT_2LINE)?;
        lcd.command(CMD_DISPLAY_ON)?;
        lcd.clear_screen()?;
        lcd.command(CMD_ENTRY_MODE_LTR)?;
        Ok(lcd)
    }

    /// Latch one nibble (upper four bits of `bits`) plus control flags.
    fn pulse(&mut self, bits: u8) -> Result<(), LcdError> {
        let bits = bits | BACKLIGHT;
        self.port.write_byte(bits | EN)?;
        std::thread::sleep(Duration::from_micros(1));
        self.port.write_byte(bits & !EN)?;
        std::thread::sleep(Duration::from_micros(50));
        Ok(())
    }

    fn send(&mut self, value: u8, mode: u8) -> Result<(), LcdError> {
        self.pulse((value & 0xF0) | mode)?;
        self.pulse(((value << 4) & 0xF0) | mode)
    }

    fn command(&mut self, cmd: u8) -> Result<(), LcdError> {
        self.send(cmd, 0)
    }

    fn clear_screen(&mut self) -> Result<(), LcdError> {
        self.command(CMD_CLEAR)?;
        std::thread::sleep(Duration::from_millis(2));
        Ok(())
    }

    fn set_cursor(&mut self, col: usize, row: usize) -> Result<(), LcdError> {
        let row = row.min(self.rows - 1);
        self.command(CMD_SET_DDRAM | (ROW_OFFSETS[row] + col as u8))
    }

    fn write_text(&mut self, text: &str) -> Result<(), LcdError> {
        for c in text.chars().take(self.columns) {
            self.send(rom_char(c), RS)?;
        }
        Ok(())
    }
}

/// Map to the printable subset shared by ASCII and the A00 character ROM.
fn rom_char(c: char) -> u8 {
    match c {
        ' '..='}' if c != '\\' => c as u8,
        _ => b'?',
    }
}

impl<P: ExpanderPort> TextDisplay for CharLcd<P> {
    fn columns(&self) -> usize {
        self.columns
    }

    fn show(&mut self, line1: &str, line2: &str) -> Result<(), DisplayError> {
        self.clear_screen()?;
        self.set_cursor(0, 0)?;
        self.write_text(line1)?;
        if !line2.is_empty() && self.rows > 1 {
            self.set_cursor(0, 1)?;
            self.write_text(line2)?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        Ok(self.clear_screen()?)
    }
}
