/// Simple example demonstrating how to use the bak_forensics library

use anyhow::Result;
use bak_forensics::utils::output_formatter::format_report;
use bak_forensics::{analyze_file, ScanConfig};

fn main() -> Result<()> {
    // Sample backup in the system temp directory
    let file_path = std::env::temp_dir().join("bak_forensics_sample.bak");

    let mut data = Vec::new();
    for record in [
        &br#"<cfdi:Comprobante Total="1160.00" SubTotal="1000.00" Fecha="2024-03-15"/>"#[..],
        b"GODE561231GR8",
        b"pago en efectivo sin comprobante",
        br#"Importe="348.80""#,
        b"TEJ2304191I0",
        b"multa SAT 15/02/2023",
        b"CPOLIZA",
    ] {
        data.extend_from_slice(record);
        data.extend_from_slice(&[0u8; 16]);
    }
    std::fs::write(&file_path, &data)?;

    println!("Analyzing backup: {}", file_path.display());

    let report = analyze_file(&file_path, &ScanConfig::default())?;
    println!("{}", format_report(&report, false));

    println!("Identifiers: {:?}", report.extracted.identifiers);
    match report.benford_analysis.result() {
        Some(result) => println!("Benford risk: {} ({} amounts)", result.risk_score, result.sample_size),
        None => println!("Benford: not enough amounts"),
    }

    std::fs::remove_file(&file_path)?;

    Ok(())
}
