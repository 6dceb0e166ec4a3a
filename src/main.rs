//! chrispack - CHRIS PROBA-1 Level-1 conversion and packaging tool.
//!
//! Converts raw RCI cubes into Zarr/GeoTIFF products and packages products
//! for archive submission:
//! - Zarr and GeoTIFF stores, plain or EOPF-style (transform)
//! - SAFE archive directories (safe)
//! - EO-SIP ZIP packages (eo-sip)
#![allow(dead_code)]

mod common;
mod config;
mod header;
mod raster;
mod safe;
mod sip;
mod store;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use config::Config;
use raster::reader::{RciReader, ReadOptions};
use raster::DataType;

#[derive(Parser)]
#[command(name = "chrispack")]
#[command(about = "CHRIS PROBA-1 Level-1 conversion and packaging tool")]
#[command(
    after_help = "QUICK START:\n  chrispack transform --rci img.rci --hdr img.hdr --hdr-txt img.hdr.txt --eopf-zarr out.zarr\n  chrispack safe --inputs acquisition_dir --output products\n  chrispack eo-sip products --output sips"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a raw RCI cube to Zarr/GeoTIFF products
    Transform {
        /// Raw RCI image file
        #[arg(long)]
        rci: PathBuf,
        /// ENVI header (.hdr) describing the cube
        #[arg(long)]
        hdr: PathBuf,
        /// CHRIS attribute dump (.hdr.txt) for product metadata
        #[arg(long)]
        hdr_txt: PathBuf,
        /// Comma-separated 1-based band subset
        #[arg(long)]
        bands: Option<String>,
        /// Reflectance scale factor to divide by
        #[arg(long)]
        scale: Option<f64>,
        /// Output sample type (uint8, int16, ..., float64)
        #[arg(long)]
        dtype: Option<String>,
        /// Write a plain Zarr store here
        #[arg(long)]
        zarr: Option<PathBuf>,
        /// Write a plain GeoTIFF here
        #[arg(long)]
        cog: Option<PathBuf>,
        /// Write an EOPF-style Zarr product here
        #[arg(long)]
        eopf_zarr: Option<PathBuf>,
        /// Write an EOPF-style COG product directory here
        #[arg(long)]
        eopf_cog: Option<PathBuf>,
        /// GPS ephemeris file for orbit-direction correction
        #[arg(long)]
        gps_file: Option<PathBuf>,
        /// Centre times file accompanying the GPS ephemeris
        #[arg(long)]
        centre_times_file: Option<PathBuf>,
    },

    /// Bundle inputs into SAFE archive directories
    Safe {
        /// Comma-separated input files or directories
        #[arg(long)]
        inputs: String,
        /// Output folder
        #[arg(long, default_value = ".")]
        output: PathBuf,
        /// Package type tag (e.g. RPI-BAS)
        #[arg(long)]
        package_type: Option<String>,
        /// Satellite identifier
        #[arg(long)]
        sat_id: Option<String>,
        /// File class
        #[arg(long)]
        file_class: Option<String>,
        /// Operating mode
        #[arg(long, default_value = "1")]
        mode: String,
    },

    /// Convert Zarr/COG products into EO-SIP packages
    EoSip {
        /// Comma-separated input files or directories
        inputs: String,
        /// Output folder
        #[arg(long, default_value = ".")]
        output: PathBuf,
        /// SAFE archive supplying the package payload and metadata extras
        #[arg(long)]
        extras: Option<PathBuf>,
        /// Satellite identifier
        #[arg(long)]
        sat_id: Option<String>,
        /// File class
        #[arg(long)]
        file_class: Option<String>,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();
    let config = Config::load();

    match cli.command {
        Commands::Transform {
            rci,
            hdr,
            hdr_txt,
            bands,
            scale,
            dtype,
            zarr,
            cog,
            eopf_zarr,
            eopf_cog,
            gps_file,
            centre_times_file,
        } => {
            let out_bands = bands
                .map(|list| {
                    list.split(',')
                        .map(|b| b.trim().parse::<usize>())
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?;
            let out_dtype = dtype
                .map(|name| {
                    DataType::parse_name(&name)
                        .ok_or_else(|| anyhow::anyhow!("Unknown dtype: {name}"))
                })
                .transpose()?;

            let reader = RciReader::open(
                &rci,
                &hdr,
                ReadOptions {
                    scale_factor: scale,
                    out_bands,
                    out_dtype,
                },
            )?;
            let mut cube = reader.read()?;

            let attributes = header::attributes::parse_attribute_text(&hdr_txt, false)?;
            raster::geo::flip_using_gps(
                &mut cube,
                &attributes,
                gps_file.as_deref(),
                centre_times_file.as_deref(),
            );

            if let Some(out) = zarr {
                store::product::write_plain_zarr(&cube, &reader.header, &out)?;
                println!("Saved Zarr to {}", out.display());
            }
            if let Some(out) = cog {
                store::product::write_plain_geotiff(&cube, &reader.header, &out)?;
                println!("Saved GeoTIFF to {}", out.display());
            }
            if let Some(out) = eopf_zarr {
                store::product::write_eopf_zarr(&cube, &reader.header, &hdr_txt, &out)?;
                println!("Saved EOPF Zarr to {}", out.display());
            }
            if let Some(out) = eopf_cog {
                store::product::write_eopf_cog(&cube, &reader.header, &hdr_txt, &out)?;
                println!("Saved EOPF COG to {}", out.display());
            }
        }

        Commands::Safe {
            inputs,
            output,
            package_type,
            sat_id,
            file_class,
            mode,
        } => {
            let options = safe::builder::SafeOptions {
                package_type,
                mode,
                file_class: file_class.unwrap_or(config.file_class),
                sat_id: sat_id.unwrap_or(config.sat_id),
            };
            safe::builder::make_safe(&inputs, &output, &options)?;
        }

        Commands::EoSip {
            inputs,
            output,
            extras,
            sat_id,
            file_class,
        } => {
            let options = sip::converter::SipOptions {
                sat_id: sat_id.unwrap_or(config.sat_id),
                file_class: file_class.unwrap_or(config.file_class),
                creator: config.sip_creator,
            };
            sip::converter::convert_eo_sip(&inputs, &output, extras.as_deref(), &options)?;
        }

        Commands::Show { what } => match what {
            ShowTarget::Config => config.print(),
        },
    }

    Ok(())
}
