//! # beamtime
//!
//! beamtime is the analysis toolkit for TimePix3 velocity map imaging experiments at the
//! CAMP endstation of FLASH, written in Rust. It reads the HDF5 files produced by the
//! TimePix converter, matches detector triggers onto FLASH train IDs, slices events by
//! ion fragment, and averages traces and camera images over whole runs.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### HDF5
//!
//! Before building beamtime, HDF5 must be installed. Typically this will be installed
//! using a package manager (homebrew, apt, etc), and the Rust libraries will auto detect
//! the location of the HDF install. If HDF5 lives in a custom location, write the
//! following snippet into the file `.cargo/config.toml` in the beamtime repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./beamtime_cli` from the top
//! level repository.
//!
//! ## Configuration
//!
//! All file locations come from a single YAML document:
//!
//! ```yml
//! file_system: core
//! paths:
//!   core: /asap3/flash/gpfs/bl1/2019/data/11005582/
//!   local: /home/user/beamtime/
//! timepix: timepix
//! pp_delay: pp_delay.yaml
//! fragments: /home/user/beamtime/fragments.yaml
//! run_numbers: /home/user/beamtime/run_numbers.yaml
//! ```
//!
//! `file_system` selects one prefix of `paths`; the TimePix directory and the delay
//! document are resolved relative to it. Fragments are grouped by experimental set:
//!
//! ```yml
//! fragments:
//!   C2H2+:
//!     tof_start: 1.50e-6
//!     tof_end: 1.55e-6
//!     center_x: 128
//!     center_y: 130
//!     start_x: 20
//!     end_x: 236
//!     start_y: 20
//!     end_y: 236
//! ```
//!
//! A fragment outside the `fragments` set is addressed as `set,name`.
//!
//! ### HDF5 Data Format
//!
//! The run files `run_XXXX_<date>.hdf5` are laid out as follows:
//!
//! ```text
//! raw - nr events
//! |---- x, y, tof, tot, trigger nr (dset)
//! centroided - nr events
//! |---- x, y, tof, tot avg, tot max, clustersize, trigger nr (dset)
//! timing
//! |---- timepix - nr events
//! |    |---- trigger nr, timestamp (dset)
//! |---- facility - nr events, shift, corr coeff
//! |    |---- train id, timestamp (dset)
//! ```
//!
//! Older files without the `timing` group are read as well (raw events only).
pub mod aggregate;
pub mod cfd;
pub mod channel;
pub mod config;
pub mod correlation;
pub mod error;
pub mod event;
pub mod filter;
pub mod fragment;
pub mod hdf_reader;
pub mod heatmap;
pub mod histogram;
pub mod image;
pub mod lookup;
pub mod polar;
pub mod run;
pub mod train_file;
