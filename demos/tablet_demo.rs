//! Example demonstrating tablet usage.
//!
//! This example shows how to:
//! - Write a tablet from sorted key-value pairs
//! - Look up keys through the block index
//! - Scan from the beginning and from a key

use std::fs;
use tablet::{CompressionType, Result, Tablet, TabletWriter, TabletWriterOptions};

fn main() -> Result<()> {
    env_logger::init();

    println!("=== Tablet Example ===\n");

    let temp_dir = std::env::temp_dir().join("tablet_demo");
    fs::create_dir_all(&temp_dir)?;
    let tablet_path = temp_dir.join("fruit.tab");

    // === Part 1: Writing a tablet ===
    println!("1. Writing a tablet...");
    {
        let options = TabletWriterOptions::new()
            .block_size(64) // tiny blocks so the index has several entries
            .key_restart_interval(2)
            .use_compression(CompressionType::default().is_available());
        let file = fs::File::create(&tablet_path)?;
        let mut writer = TabletWriter::new(std::io::BufWriter::new(file), options)?;

        // Keys must arrive in sorted order
        let entries: Vec<(&[u8], &[u8])> = vec![
            (b"apple", b"A red or green fruit"),
            (b"banana", b"A yellow tropical fruit"),
            (b"cherry", b"A small red stone fruit"),
            (b"date", b"A sweet brown fruit from palm trees"),
            (b"elderberry", b"A dark purple berry"),
            (b"fig", b"A soft sweet fruit with many seeds"),
            (b"grape", b"A small round fruit that grows in clusters"),
        ];

        for (key, value) in &entries {
            writer.add(key, value)?;
        }

        writer.finish()?;
        println!("   ✓ Tablet created: {} bytes", writer.offset());
        println!("   ✓ {} entries in {} blocks\n", writer.num_entries(), writer.num_blocks());
    }

    // === Part 2: Point lookups ===
    println!("2. Reading from the tablet...");
    let tablet = Tablet::open(&tablet_path)?;
    {
        println!("   File size: {} bytes", tablet.file_size());
        println!("   Number of blocks: {}\n", tablet.num_blocks());

        println!("   Looking up keys:");
        let keys_to_lookup: Vec<&[u8]> = vec![b"banana", b"fig", b"mango"];

        for key in &keys_to_lookup {
            match tablet.get(key)? {
                Some(value) => {
                    println!(
                        "     '{}' -> '{}'",
                        String::from_utf8_lossy(key),
                        String::from_utf8_lossy(&value)
                    );
                }
                None => {
                    println!("     '{}' -> NOT FOUND", String::from_utf8_lossy(key));
                }
            }
        }
        println!();

        println!("   Block index:");
        for entry in tablet.index().entries() {
            println!(
                "     '{}' @ {} ({} bytes stored, {:?})",
                String::from_utf8_lossy(&entry.first_key),
                entry.handle.offset,
                entry.handle.size,
                entry.compression
            );
        }
        println!();
    }

    // === Part 3: Scanning ===
    println!("3. Scanning...");
    {
        let mut iter = tablet.iter()?;
        let mut count = 0;
        while iter.valid() {
            count += 1;
            iter.advance()?;
        }
        println!("   Full scan: {} entries", count);

        print!("   From 'coconut':");
        let mut iter = tablet.find(Some(b"coconut".as_slice()))?;
        while iter.valid() {
            print!(" {}", String::from_utf8_lossy(iter.key()));
            iter.advance()?;
        }
        println!("\n");
    }

    fs::remove_dir_all(&temp_dir)?;
    println!("=== Example Complete ===");

    Ok(())
}
