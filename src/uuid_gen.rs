//! Client-side 16-byte identifier generator.
//!
//! The layout is bespoke, not a standard UUID version:
//! `TIME_LOW(32) | TIME_MID(16) | TIME_HI_AND_VER(16) | PROCESS_ID(16) | HW_MAC(48)`.
//! `TIME_LOW/MID/HI` come from the system clock; when two calls land in the
//! same clock tick the generator borrows from the future to keep the
//! `(TIME_LOW|TIME_MID|TIME_HI)` substring strictly increasing within a
//! process.

use crate::err::{Error, ErrorKind};
use rand::RngCore;
use rand::SeedableRng;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const VERSION: u16 = 0x7000;

#[derive(Debug)]
struct State {
	last_ticks: u64,
	hw_mac: u64,
	process_id: u16,
	shutdown: bool,
}

/// Process-wide identifier generator.
///
/// The crate's one piece of global mutable state, given an explicit
/// `init`/`generate`/`shutdown` lifecycle rather than a singleton that
/// initializes itself on first use, since the fallback seed is
/// caller-supplied.
#[derive(Debug)]
pub struct Generator {
	state: Mutex<Option<State>>,
}

impl Generator {
	/// Constructs a generator that has not yet been initialized.
	pub const fn new() -> Self {
		Generator {
			state: Mutex::new(None),
		}
	}

	/// Initializes the generator.
	///
	/// `seed` feeds the `HW_MAC` fallback when no network adapter's MAC
	/// address can be discovered; it is mixed with the current clock and a
	/// random draw so two processes started with the same seed still do
	/// not collide.
	pub fn init(&self, seed: u64) {
		let hw_mac = discover_mac().unwrap_or_else(|| fallback_mac(seed));
		let mut guard = self.state.lock().unwrap();
		*guard = Some(State {
			last_ticks: 0,
			hw_mac,
			process_id: std::process::id() as u16,
			shutdown: false,
		});
	}

	/// Generates the next identifier.
	///
	/// Fails with [`ErrorKind::Internal`] if called before `init` or after
	/// `shutdown`.
	pub fn generate(&self) -> Result<[u8; 16], Error> {
		let mut guard = self.state.lock().unwrap();
		let state = guard.as_mut().ok_or_else(|| {
			ErrorKind::Internal.with_message("UUID generator used before init or after shutdown")
		})?;
		if state.shutdown {
			return Err(ErrorKind::Internal.with_message("UUID generator used after shutdown"));
		}

		let now = current_ticks();
		let ticks = if now > state.last_ticks {
			now
		} else {
			// Clock granularity caught up with a previous call; borrow from
			// the future by one logical tick to preserve strict monotonicity.
			state.last_ticks + 1
		};
		state.last_ticks = ticks;

		let time_low = (ticks & 0xFFFF_FFFF) as u32;
		let time_mid = ((ticks >> 32) & 0xFFFF) as u16;
		let time_hi = (((ticks >> 48) & 0x0FFF) as u16) | VERSION;

		let mut out = [0u8; 16];
		out[0..4].copy_from_slice(&time_low.to_be_bytes());
		out[4..6].copy_from_slice(&time_mid.to_be_bytes());
		out[6..8].copy_from_slice(&time_hi.to_be_bytes());
		out[8..10].copy_from_slice(&state.process_id.to_be_bytes());
		out[10..16].copy_from_slice(&state.hw_mac.to_be_bytes()[2..8]);
		Ok(out)
	}

	/// Releases the generator's state. Further `generate` calls fail.
	pub fn shutdown(&self) {
		if let Some(state) = self.state.lock().unwrap().as_mut() {
			state.shutdown = true;
		}
	}
}

impl Default for Generator {
	fn default() -> Self {
		Self::new()
	}
}

fn current_ticks() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock before unix epoch")
		.as_nanos() as u64
}

fn discover_mac() -> Option<u64> {
	let addr = mac_address::get_mac_address().ok()??;
	let bytes = addr.bytes();
	Some(u64::from_be_bytes([
		0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
	]))
}

fn fallback_mac(seed: u64) -> u64 {
	let mut rng = rand::rngs::StdRng::seed_from_u64(seed ^ current_ticks());
	let draw = rng.next_u64();
	// Set the locally-administered bit (as real MAC fallbacks conventionally
	// do) so a fallback address is distinguishable from a discovered one.
	(draw & 0x0000_FFFF_FFFF_FFFF) | 0x0000_0200_0000_0000
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::thread;

	#[test]
	fn generate_before_init_fails() {
		let gen = Generator::new();
		assert_eq!(gen.generate().unwrap_err().kind(), ErrorKind::Internal);
	}

	#[test]
	fn generate_after_shutdown_fails() {
		let gen = Generator::new();
		gen.init(1);
		gen.generate().unwrap();
		gen.shutdown();
		assert!(gen.generate().is_err());
	}

	#[test]
	fn sequential_calls_are_distinct_and_monotonic() {
		let gen = Generator::new();
		gen.init(42);
		let mut prev: Option<u64> = None;
		for _ in 0..1000 {
			let id = gen.generate().unwrap();
			let substring = u64::from(u32::from_be_bytes(id[0..4].try_into().unwrap())) << 32
				| u64::from(u16::from_be_bytes(id[4..6].try_into().unwrap())) << 16
				| u64::from(u16::from_be_bytes(id[6..8].try_into().unwrap()));
			if let Some(p) = prev {
				assert!(substring > p, "monotonic substring must strictly increase");
			}
			prev = Some(substring);
		}
	}

	#[test]
	fn concurrent_calls_produce_unique_values() {
		let gen = Arc::new(Generator::new());
		gen.init(7);
		let mut handles = Vec::new();
		for _ in 0..8 {
			let gen = gen.clone();
			handles.push(thread::spawn(move || {
				(0..200).map(|_| gen.generate().unwrap()).collect::<Vec<_>>()
			}));
		}
		let mut all = Vec::new();
		for h in handles {
			all.extend(h.join().unwrap());
		}
		let unique: std::collections::HashSet<_> = all.iter().collect();
		assert_eq!(unique.len(), all.len());
	}
}
