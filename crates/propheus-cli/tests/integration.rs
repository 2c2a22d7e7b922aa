use propheus_cli::input::Input;
use propheus_cli::runner::Runner;
use propheus_core::config::Configuration;
use propheus_core::fasta::Fasta;
use propheus_core::ion_series::{IonSeries, Kind};
use propheus_core::mass::{mz, MassType};
use propheus_core::search::Builder;
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;

const FASTA: &str = ">sp|P1|ALPHA first\nMKLLSAMPLEKGWCHEEKAVDTFLRPEPTIDEKSSGR\n>sp|P2|BETA second\nMTNQYWFRDDLAK\n";

fn workspace(name: &str) -> anyhow::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("propheus-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Synthetic MGF holding the b/y ions of `sequence` (from the first protein)
fn mgf_for(sequences: &[&str]) -> anyhow::Result<String> {
    let config = Arc::new(Configuration::builtin()?);
    let parameters = Builder {
        fixed_mods: Some(vec![]),
        variable_mods: Some(vec![]),
        peptide_min_mass: Some(300.0),
        ..Default::default()
    }
    .make_parameters(&config)?;
    let search = propheus_core::search::Search::new(config.clone(), parameters);
    let fasta = Fasta::parse(FASTA, "rev_");
    let ions = IonSeries::new(&[Kind::B, Kind::Y], &config, MassType::Monoisotopic);

    let mut mgf = String::from("CHARGE=2+\n\n");
    for (idx, sequence) in sequences.iter().enumerate() {
        let candidate = search
            .candidates(&fasta.proteins[0])
            .find(|c| c.peptide.sequence() == *sequence)
            .ok_or_else(|| anyhow::anyhow!("{} not digested", sequence))?;
        writeln!(mgf, "BEGIN IONS")?;
        writeln!(mgf, "TITLE=scan={}", idx + 1)?;
        writeln!(mgf, "SCANS={}", idx + 1)?;
        writeln!(mgf, "RTINSECONDS={}", 60 * (idx + 1))?;
        writeln!(mgf, "PEPMASS={} 1000.0", mz(candidate.monoisotopic, 2))?;
        for fragment in ions.compute_fragments(&candidate.residue_masses, 2) {
            writeln!(mgf, "{:.5} 100.0", fragment.mz)?;
        }
        writeln!(mgf, "END IONS\n")?;
    }
    Ok(mgf)
}

#[test]
fn search_mgf() -> anyhow::Result<()> {
    let dir = workspace("search")?;
    let fasta = dir.join("db.fasta");
    let mgf = dir.join("run.mgf");
    let output = dir.join("out");
    std::fs::write(&fasta, FASTA)?;
    std::fs::write(&mgf, mgf_for(&["LLSAMPLEK", "AVDTFLRPEPTIDEK"])?)?;

    let json = serde_json::json!({
        "search": {
            "fixed_mods": [],
            "variable_mods": [],
            "peptide_min_mass": 300.0,
            "min_matched_peaks": 3,
            "precursor_tol": { "ppm": 10.0 },
            "product_tol": { "da": 0.02 },
        },
        "fasta": fasta,
        "mgf_paths": [mgf],
        "output_directory": output,
    });
    let parameters = dir.join("search.json");
    std::fs::write(&parameters, serde_json::to_vec_pretty(&json)?)?;

    let summary = Input::load(&parameters)?.build().and_then(Runner::new)?.run()?;
    assert_eq!(summary.spectra, 2);
    assert_eq!(summary.identifications, 2);
    assert_eq!(summary.passing, 2);
    assert_eq!(summary.written, 2);

    let tsv = std::fs::read_to_string(output.join("results.propheus.tsv"))?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(tsv.as_bytes());
    let headers = rdr.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name).unwrap();

    let mut peptides = rdr
        .records()
        .map(|row| {
            let row = row.unwrap();
            assert_eq!(&row[column("proteins")], "sp|P1|ALPHA");
            assert_eq!(&row[column("label")], "1");
            assert_eq!(&row[column("charge")], "2");
            row[column("peptide")].to_string()
        })
        .collect::<Vec<_>>();
    peptides.sort();
    assert_eq!(peptides, vec!["AVDTFLRPEPTIDEK", "LLSAMPLEK"]);

    let results: serde_json::Value =
        serde_json::from_slice(&std::fs::read(output.join("results.json"))?)?;
    assert_eq!(results["output_paths"].as_array().map(|p| p.len()), Some(2));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn malformed_table_is_fatal() -> anyhow::Result<()> {
    let dir = workspace("tables")?;
    let modifications = dir.join("modifications.csv");
    std::fs::write(
        &modifications,
        "description,type,target,monoisotopic,average,usage\n\
         Oxidation (M),residue,M,heavy,15.9994,variable\n",
    )?;

    let json = serde_json::json!({
        "tables": { "modifications": modifications },
        "fasta": dir.join("missing.fasta"),
        "mgf_paths": [],
        "output_directory": dir.join("out"),
    });
    let parameters = dir.join("search.json");
    std::fs::write(&parameters, serde_json::to_vec(&json)?)?;

    let err = match Input::load(&parameters)?.build() {
        Ok(_) => panic!("malformed table was accepted"),
        Err(err) => format!("{:#}", err),
    };
    assert!(err.contains("modification"), "{}", err);
    assert!(err.contains("line 2"), "{}", err);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn unknown_protease_is_reported() -> anyhow::Result<()> {
    let dir = workspace("protease")?;
    let json = serde_json::json!({
        "search": { "enzyme": { "protease": "elastase" } },
        "fasta": "db.fasta",
        "mgf_paths": ["run.mgf"],
        "output_directory": dir.join("out"),
    });
    let parameters = dir.join("search.json");
    std::fs::write(&parameters, serde_json::to_vec(&json)?)?;

    let err = match Input::load(&parameters)?.build() {
        Ok(_) => panic!("unknown protease was accepted"),
        Err(err) => format!("{:#}", err),
    };
    assert!(err.contains("elastase"), "{}", err);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
