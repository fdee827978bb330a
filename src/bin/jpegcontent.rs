//! jpegcontent CLI - lossless JPEG rotation and metadata editing.
//!
//! Rotations and flips are done on the compressed coefficients, so repeated
//! edits never degrade the image.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use jpegcontent_rs::{JpegContent, JpegContentOptions, Orientation};

/// Lossless JPEG rotation with EXIF orientation, comment and thumbnail support
#[derive(Parser)]
#[command(name = "jpegcontent")]
#[command(version)]
#[command(about = "Lossless JPEG rotation and metadata editing", long_about = None)]
#[command(after_help = "EXAMPLES:
    jpegcontent info -i photo.jpg
    jpegcontent transform -i photo.jpg -o rotated.jpg -t rot90 -t hflip
    jpegcontent auto-orient -i photo.jpg -o upright.jpg
    jpegcontent comment -i photo.jpg -o out.jpg --text \"holiday\"

TRANSFORMS:
    normal, hflip, rot180, vflip, transpose, rot90, transverse, rot270")]
struct Cli {
    /// Report the encoded size in `info` instead of the display size
    #[arg(long, global = true)]
    raw_size: bool,

    /// JPEG quality for embedded thumbnails
    #[arg(long, global = true, default_value = "75")]
    thumbnail_quality: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show size, orientation, comment, resolution and thumbnail
    #[command(visible_alias = "i")]
    Info {
        #[arg(short, long, help = "Path to the input JPEG file")]
        input: PathBuf,

        /// Also list every EXIF tag
        #[arg(short, long)]
        tags: bool,
    },

    /// Apply one or more lossless transforms, composed in order
    #[command(visible_alias = "t")]
    Transform {
        #[arg(short, long, help = "Path to the input JPEG file")]
        input: PathBuf,

        #[arg(short, long, help = "Path for the output file")]
        output: PathBuf,

        /// Transform to apply; repeat to compose
        #[arg(short = 't', long = "transform", required = true)]
        transforms: Vec<Orientation>,
    },

    /// Rotate the image upright according to its EXIF orientation
    AutoOrient {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Set or clear the JPEG comment
    Comment {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// New comment; an empty string removes it
        #[arg(long)]
        text: String,
    },

    /// Mark the image as normally oriented without touching pixels
    ResetOrientation {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Extract the embedded EXIF thumbnail
    Thumbnail {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, help = "Path for the extracted JPEG thumbnail")]
        output: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let options = JpegContentOptions::new()
        .apply_exif_orientation(!cli.raw_size)
        .thumbnail_quality(cli.thumbnail_quality);

    let result = match cli.command {
        Commands::Info { input, tags } => show_info(&input, options, tags),
        Commands::Transform {
            input,
            output,
            transforms,
        } => edit(&input, &output, options, |content| {
            for orientation in &transforms {
                content.transform(*orientation);
            }
        }),
        Commands::AutoOrient { input, output } => {
            edit(&input, &output, options, JpegContent::apply_orientation)
        }
        Commands::Comment {
            input,
            output,
            text,
        } => edit(&input, &output, options, |content| content.set_comment(&text)),
        Commands::ResetOrientation { input, output } => {
            edit(&input, &output, options, JpegContent::reset_orientation)
        }
        Commands::Thumbnail { input, output } => extract_thumbnail(&input, &output, options),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load(input: &PathBuf, options: JpegContentOptions) -> Result<JpegContent, Box<dyn std::error::Error>> {
    let mut content = JpegContent::with_options(options);
    content.load(input)?;
    Ok(content)
}

fn edit<F>(
    input: &PathBuf,
    output: &PathBuf,
    options: JpegContentOptions,
    change: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut JpegContent),
{
    let mut content = load(input, options)?;
    change(&mut content);
    content.save_to_path(output)?;
    println!("Wrote {:?} ({} bytes, {})", output, content.raw_data().len(), content.size());
    Ok(())
}

fn show_info(input: &PathBuf, options: JpegContentOptions, tags: bool) -> Result<(), Box<dyn std::error::Error>> {
    let content = load(input, options)?;

    println!("File: {:?}", input);
    println!("Size: {} bytes", content.raw_data().len());
    println!();
    println!("  Dimensions:  {}", content.size());
    println!("  Orientation: {} ({})", content.orientation(), content.orientation().exif_value());
    let comment = content.comment();
    if !comment.is_empty() {
        println!("  Comment:     {}", comment);
    }
    let (x, y) = (content.dots_per_meter_x(), content.dots_per_meter_y());
    if x > 0 || y > 0 {
        println!("  Resolution:  {}x{} dots/m", x, y);
    }
    match content.thumbnail() {
        Some(thumbnail) => println!("  Thumbnail:   {}x{}", thumbnail.width(), thumbnail.height()),
        None => println!("  Thumbnail:   none"),
    }
    if tags {
        println!();
        for (key, value) in content.metadata().entries() {
            println!("  {:<40} {}", key, value);
        }
    }
    Ok(())
}

fn extract_thumbnail(
    input: &PathBuf,
    output: &PathBuf,
    options: JpegContentOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = load(input, options)?;
    let bytes = content
        .metadata()
        .thumbnail_bytes()
        .ok_or("no embedded thumbnail")?;
    fs::write(output, bytes)?;
    println!("Wrote {:?} ({} bytes)", output, bytes.len());
    Ok(())
}
