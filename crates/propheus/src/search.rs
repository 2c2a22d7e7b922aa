use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Configuration;
use crate::digest::{apply_fixed, variable_isoforms, Digester, InitiatorMethionine};
use crate::fasta::{Fasta, Protein};
use crate::fdr::{self, Identification};
use crate::ion_series::{IonSeries, Kind};
use crate::mass::{MassType, Tolerance};
use crate::modification::{ModUsage, Modification};
use crate::query::{Precursor, Queries, QuerySettings};
use crate::scoring::{Candidate, ScoreWeights, Scorer};
use crate::sink::{self, PsmSink};
use crate::spectrum::{ProductSpectrum, SpectrumProcessor};
use crate::Error;

/// Where decoy sequences come from
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoyStrategy {
    /// Use decoys already present in the FASTA file, if any
    None,
    /// Append an M-preserving reversed copy of every protein
    #[default]
    Protein,
    /// Emit a reversed copy of every digested peptide
    Peptide,
    /// Score the reverse of every candidate against the same queries
    Fusion,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct EnzymeBuilder {
    /// Protease name, as listed in the protease table
    pub protease: Option<String>,
    /// How many missed cleavages to use
    pub missed_cleavages: Option<u8>,
    /// Minimum peptide length that will be fragmented
    pub min_len: Option<usize>,
    /// Maximum peptide length that will be fragmented
    pub max_len: Option<usize>,
    pub initiator_methionine: Option<InitiatorMethionine>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
/// User-facing search settings. Everything is optional
pub struct Builder {
    pub enzyme: Option<EnzymeBuilder>,
    /// Descriptions of fixed modifications. Defaults to the table's `fixed` rows
    pub fixed_mods: Option<Vec<String>>,
    /// Descriptions of variable modifications. Defaults to the table's
    /// `variable` rows
    pub variable_mods: Option<Vec<String>>,
    /// Limit number of variable modifications on a peptide
    pub max_variable_mods: Option<usize>,
    /// Limit number of modified forms generated per peptide
    pub max_isoforms: Option<usize>,
    /// Use this prefix for decoy proteins
    pub decoy_tag: Option<String>,
    pub decoy_strategy: Option<DecoyStrategy>,
    /// Minimum peptide monoisotopic mass that will be scored
    pub peptide_min_mass: Option<f64>,
    /// Maximum peptide monoisotopic mass that will be scored
    pub peptide_max_mass: Option<f64>,
    pub precursor_tol: Option<Tolerance>,
    pub product_tol: Option<Tolerance>,
    /// Charge range tried for spectra without a precursor charge
    pub precursor_charge: Option<(u8, u8)>,
    pub isolation_window: Option<Tolerance>,
    pub rt_tolerance: Option<f64>,
    /// Which kind of fragment ions to generate
    pub ion_kinds: Option<Vec<Kind>>,
    pub match_fragment_charge: Option<bool>,
    /// Number of matches kept per query and reported per precursor
    pub report_psms: Option<usize>,
    pub min_matched_peaks: Option<usize>,
    pub score_weights: Option<ScoreWeights>,
    pub desired_fdr: Option<f64>,
    /// Keep only this many of the most intense peaks of each spectrum
    pub take_top_n: Option<usize>,
    pub min_fragment_mz: Option<f64>,
    pub max_fragment_mz: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct Parameters {
    pub digester: Digester,
    pub fixed_mods: Vec<Arc<Modification>>,
    pub variable_mods: Vec<Arc<Modification>>,
    pub max_variable_mods: usize,
    pub max_isoforms: usize,
    pub decoy_tag: String,
    pub decoy_strategy: DecoyStrategy,
    pub peptide_min_mass: f64,
    pub peptide_max_mass: f64,
    pub precursor_tol: Tolerance,
    pub product_tol: Tolerance,
    pub query: QuerySettings,
    pub ion_kinds: Vec<Kind>,
    pub match_fragment_charge: bool,
    pub report_psms: usize,
    pub min_matched_peaks: usize,
    pub weights: ScoreWeights,
    pub desired_fdr: f64,
    pub processor: SpectrumProcessor,
}

fn resolve_mods(
    config: &Configuration,
    names: Option<Vec<String>>,
    usage: ModUsage,
) -> Result<Vec<Arc<Modification>>, Error> {
    match names {
        None => Ok(config.modifications_by_usage(usage)),
        Some(names) => names
            .iter()
            .map(|name| {
                config
                    .modification(name)
                    .ok_or_else(|| Error::UnknownModification(name.clone()))
            })
            .collect(),
    }
}

impl Builder {
    pub fn make_parameters(self, config: &Configuration) -> Result<Parameters, Error> {
        let enzyme = self.enzyme.unwrap_or_default();
        let protease_name = enzyme.protease.unwrap_or_else(|| "trypsin".into());
        let protease = config
            .protease(&protease_name)
            .cloned()
            .ok_or(Error::UnknownProtease(protease_name))?;

        let decoy_strategy = self.decoy_strategy.unwrap_or_default();
        let min_len = enzyme.min_len.unwrap_or(5).max(1);
        let digester = Digester {
            protease,
            missed_cleavages: enzyme.missed_cleavages.unwrap_or(2),
            min_len,
            max_len: enzyme.max_len.unwrap_or(50).max(min_len),
            initiator_methionine: enzyme.initiator_methionine.unwrap_or_default(),
            generate_decoys: decoy_strategy == DecoyStrategy::Peptide,
        };

        let precursor_tol = self.precursor_tol.unwrap_or(Tolerance::Ppm(10.0));
        let (min_z, max_z) = self.precursor_charge.unwrap_or((2, 4));
        if min_z == 0 || min_z > max_z {
            return Err(Error::Parameter(format!(
                "invalid precursor charge range ({}, {})",
                min_z, max_z
            )));
        }

        let desired_fdr = self.desired_fdr.unwrap_or(0.01);
        if !(0.0..=1.0).contains(&desired_fdr) {
            return Err(Error::Parameter(format!(
                "desired FDR must be within [0, 1], got {}",
                desired_fdr
            )));
        }

        Ok(Parameters {
            digester,
            fixed_mods: resolve_mods(config, self.fixed_mods, ModUsage::Fixed)?,
            variable_mods: resolve_mods(config, self.variable_mods, ModUsage::Variable)?,
            max_variable_mods: self.max_variable_mods.unwrap_or(2),
            max_isoforms: self.max_isoforms.map(|x| x.max(1)).unwrap_or(1024),
            decoy_tag: self.decoy_tag.unwrap_or_else(|| "rev_".into()),
            decoy_strategy,
            peptide_min_mass: self.peptide_min_mass.unwrap_or(500.0),
            peptide_max_mass: self.peptide_max_mass.unwrap_or(5000.0),
            precursor_tol,
            product_tol: self.product_tol.unwrap_or(Tolerance::Da(0.02)),
            query: QuerySettings {
                min_precursor_charge: min_z,
                max_precursor_charge: max_z,
                isolation_window: self.isolation_window,
                precursor_tol,
                rt_tolerance: self.rt_tolerance.unwrap_or(0.0).abs(),
            },
            ion_kinds: self.ion_kinds.unwrap_or_else(|| vec![Kind::B, Kind::Y]),
            match_fragment_charge: self.match_fragment_charge.unwrap_or(false),
            report_psms: self.report_psms.unwrap_or(1).max(1),
            min_matched_peaks: self.min_matched_peaks.unwrap_or(4),
            weights: self.score_weights.unwrap_or_default(),
            desired_fdr,
            processor: SpectrumProcessor::new(
                self.take_top_n.unwrap_or(usize::MAX),
                self.min_fragment_mz.unwrap_or(0.0),
                self.max_fragment_mz.unwrap_or(f64::MAX),
            ),
        })
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct SearchStats {
    /// Candidate peptides (including isoforms and decoys) generated
    pub peptides: usize,
    /// (query, peptide) pairs scored
    pub pairs: usize,
    pub duration: Duration,
}

pub struct SearchResult {
    pub spectra: Vec<ProductSpectrum>,
    pub precursors: Vec<Precursor>,
    /// Best first, with q-values assigned
    pub identifications: Vec<Identification>,
    /// Number of leading identifications within the desired FDR
    pub passing: usize,
    pub stats: SearchStats,
}

impl SearchResult {
    pub fn passing(&self) -> &[Identification] {
        &self.identifications[..self.passing]
    }

    /// Write matches of passing identifications (or every identification)
    pub fn export<S: PsmSink + ?Sized>(&self, sink: &mut S, only_passing: bool) -> Result<usize, Error> {
        let ids = match only_passing {
            true => self.passing(),
            false => &self.identifications,
        };
        sink::export(&self.spectra, &self.precursors, ids, sink)
    }
}

pub struct Search {
    pub config: Arc<Configuration>,
    pub parameters: Parameters,
    ion_series: IonSeries,
}

impl Search {
    pub fn new(config: Arc<Configuration>, parameters: Parameters) -> Self {
        let ion_series = IonSeries::new(&parameters.ion_kinds, &config, MassType::Monoisotopic);
        Search {
            config,
            parameters,
            ion_series,
        }
    }

    /// Proteins to digest under the configured decoy strategy
    pub fn proteins(&self, fasta: &Fasta) -> Result<Vec<Arc<Protein>>, Error> {
        match self.parameters.decoy_strategy {
            DecoyStrategy::None => Ok(fasta.proteins.clone()),
            DecoyStrategy::Protein => fasta.with_reversed_decoys(),
            DecoyStrategy::Peptide | DecoyStrategy::Fusion => {
                match fasta.proteins.iter().find(|p| p.decoy) {
                    Some(decoy) => Err(Error::DecoyContradiction(decoy.accession.clone())),
                    None => Ok(fasta.proteins.clone()),
                }
            }
        }
    }

    /// Every scorable peptide of `protein`: digested, fixed modifications
    /// applied, variable isoforms expanded and filtered by mass
    pub fn candidates<'s>(&'s self, protein: &Arc<Protein>) -> impl Iterator<Item = Candidate> + 's {
        let params = &self.parameters;
        params
            .digester
            .digest(protein)
            .flat_map(move |mut peptide| {
                apply_fixed(&mut peptide, &params.fixed_mods);
                variable_isoforms(
                    &peptide,
                    &params.variable_mods,
                    params.max_variable_mods,
                    params.max_isoforms,
                )
            })
            .filter_map(move |peptide| {
                if peptide.monoisotopic(&self.config).is_none() {
                    log::trace!("skipping {}: unknown residue", peptide.sequence());
                    return None;
                }
                Candidate::new(peptide, &self.config)
            })
            .filter(move |c| {
                c.monoisotopic >= params.peptide_min_mass && c.monoisotopic <= params.peptide_max_mass
            })
    }

    fn scorer(&self) -> Scorer<'_> {
        Scorer {
            ion_series: &self.ion_series,
            precursor_tol: self.parameters.precursor_tol,
            product_tol: self.parameters.product_tol,
            match_fragment_charge: self.parameters.match_fragment_charge,
            weights: self.parameters.weights,
        }
    }

    /// Score `candidate` against every query in its precursor window,
    /// returning the number of pairs scored
    fn score_candidate(&self, scorer: &Scorer, queries: &Queries, candidate: &Candidate) -> usize {
        let window = queries.window(candidate.monoisotopic, self.parameters.precursor_tol);
        let scored = window.len();
        for query in &queries.queries[window] {
            let spectrum = &queries.spectra[query.spectrum];
            let psm = scorer.score(query, spectrum, candidate);
            query.insert(
                psm,
                self.parameters.report_psms,
                self.parameters.min_matched_peaks,
            );
        }
        scored
    }

    /// Parallel phase: stream candidates of every protein and offer their
    /// matches to the queries
    pub fn search(&self, proteins: &[Arc<Protein>], queries: &Queries) -> SearchStats {
        let counter = AtomicUsize::new(0);
        let pairs = AtomicUsize::new(0);
        let start = Instant::now();
        let scorer = self.scorer();
        let fusion = self.parameters.decoy_strategy == DecoyStrategy::Fusion;

        proteins
            .par_iter()
            .flat_map_iter(|protein| self.candidates(protein))
            .for_each(|candidate| {
                let prev = counter.fetch_add(1, Ordering::Relaxed);
                if prev > 0 && prev % 100_000 == 0 {
                    let duration = Instant::now().duration_since(start).as_millis() as usize;
                    let rate = prev * 1000 / (duration + 1);
                    log::trace!("- scored {} peptides ({} peptides/s)", prev, rate);
                }

                let mut scored = self.score_candidate(&scorer, queries, &candidate);
                if fusion {
                    if let Some(reverse) = Candidate::new(candidate.peptide.reverse(), &self.config)
                    {
                        scored += self.score_candidate(&scorer, queries, &reverse);
                    }
                }
                pairs.fetch_add(scored, Ordering::Relaxed);
            });

        let duration = Instant::now().duration_since(start);
        let peptides = counter.load(Ordering::Relaxed);
        let rate = peptides * 1000 / (duration.as_millis() as usize + 1);
        log::info!(
            "- search:  {:8} ms ({} peptides/s)",
            duration.as_millis(),
            rate
        );
        SearchStats {
            peptides,
            pairs: pairs.load(Ordering::Relaxed),
            duration,
        }
    }

    pub fn run(&self, fasta: &Fasta, spectra: Vec<ProductSpectrum>) -> Result<SearchResult, Error> {
        let proteins = self.proteins(fasta)?;
        log::info!(
            "searching {} proteins ({} decoys) against {} spectra",
            proteins.len(),
            proteins.iter().filter(|p| p.decoy).count(),
            spectra.len()
        );

        let queries = Queries::build(spectra, &self.parameters.query);
        log::info!(
            "- indexed {} precursors into {} queries",
            queries.precursors.len(),
            queries.len()
        );

        let stats = self.search(&proteins, &queries);
        log::info!(
            "- scored {} peptides, {} peptide-spectrum pairs",
            stats.peptides,
            stats.pairs
        );

        let report = self.parameters.report_psms;
        let (spectra, mut precursors) = fdr::aggregate(queries, report);
        fdr::rescore_with_evidence(&mut precursors, &self.parameters.weights, report);

        let mut identifications = fdr::identifications(&precursors);
        fdr::sort_for_fdr(&mut identifications);
        let passing = fdr::assign_q_values(&mut identifications, self.parameters.desired_fdr);
        log::info!(
            "- {} identifications, {} at {}% FDR",
            identifications.len(),
            passing,
            self.parameters.desired_fdr * 100.0
        );

        Ok(SearchResult {
            spectra,
            precursors,
            identifications,
            passing,
            stats,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mass::mz;
    use crate::spectrum::RawSpectrum;

    const FASTA: &str = ">sp|P1|ONE\nMAGCKPEPTIDERLLSAMPLEKGGHHEEK\n>sp|P2|TWO\nMSTQWEKYLNPAFDKVGHR\n";

    fn builder() -> Builder {
        Builder {
            fixed_mods: Some(vec![]),
            variable_mods: Some(vec![]),
            peptide_min_mass: Some(300.0),
            min_matched_peaks: Some(2),
            ..Default::default()
        }
    }

    fn search(builder: Builder) -> Search {
        let config = Arc::new(Configuration::builtin().unwrap());
        let parameters = builder.make_parameters(&config).unwrap();
        Search::new(config, parameters)
    }

    #[test]
    fn defaults() {
        let config = Configuration::builtin().unwrap();
        let parameters = Builder::default().make_parameters(&config).unwrap();
        assert_eq!(parameters.digester.protease.name, "trypsin");
        assert_eq!(parameters.decoy_strategy, DecoyStrategy::Protein);
        assert_eq!(parameters.decoy_tag, "rev_");
        assert_eq!(parameters.ion_kinds, vec![Kind::B, Kind::Y]);
        assert_eq!(parameters.report_psms, 1);
        assert_eq!(parameters.desired_fdr, 0.01);
        assert!(parameters
            .fixed_mods
            .iter()
            .any(|m| m.description == "Carbamidomethyl (C)"));
        assert!(parameters
            .variable_mods
            .iter()
            .any(|m| m.description == "Oxidation (M)"));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let config = Configuration::builtin().unwrap();
        let builder = Builder {
            enzyme: Some(EnzymeBuilder {
                protease: Some("elastase".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            builder.make_parameters(&config),
            Err(Error::UnknownProtease(name)) if name == "elastase"
        ));

        let builder = Builder {
            variable_mods: Some(vec!["Phospho (Q)".into()]),
            ..Default::default()
        };
        assert!(matches!(
            builder.make_parameters(&config),
            Err(Error::UnknownModification(_))
        ));

        let builder = Builder {
            precursor_charge: Some((3, 2)),
            ..Default::default()
        };
        assert!(matches!(
            builder.make_parameters(&config),
            Err(Error::Parameter(_))
        ));
    }

    #[test]
    fn decoys_in_fasta_contradict_generated_decoys() {
        let fasta = Fasta::parse(">rev_ONE\nKEDITPEPK\n>ONE\nKPEPTIDEK\n", "rev_");
        for strategy in [
            DecoyStrategy::Protein,
            DecoyStrategy::Peptide,
            DecoyStrategy::Fusion,
        ] {
            let search = search(Builder {
                decoy_strategy: Some(strategy),
                ..builder()
            });
            assert!(matches!(
                search.proteins(&fasta),
                Err(Error::DecoyContradiction(acc)) if acc == "rev_ONE"
            ));
        }

        let search = search(Builder {
            decoy_strategy: Some(DecoyStrategy::None),
            ..builder()
        });
        assert_eq!(search.proteins(&fasta).unwrap().len(), 2);
    }

    #[test]
    fn peptide_decoys_mirror_targets() {
        let search = search(Builder {
            decoy_strategy: Some(DecoyStrategy::Peptide),
            ..builder()
        });
        let fasta = Fasta::parse(FASTA, "rev_");
        let proteins = search.proteins(&fasta).unwrap();
        assert_eq!(proteins.len(), 2);

        let candidates = proteins
            .iter()
            .flat_map(|p| search.candidates(p))
            .collect::<Vec<_>>();
        let decoys = candidates.iter().filter(|c| c.peptide.is_decoy()).count();
        assert!(decoys > 0);
        assert_eq!(decoys * 2, candidates.len());
    }

    #[test]
    fn unknown_residues_are_skipped() {
        let search = search(builder());
        let fasta = Fasta::parse(">sp|P3|X\nPEPTIDEKLLSXMPLEKAVDTFLR\n", "rev_");
        let sequences = search
            .candidates(&fasta.proteins[0])
            .map(|c| c.peptide.sequence())
            .collect::<Vec<_>>();
        assert!(sequences.iter().any(|s| s == "PEPTIDEK"));
        assert!(sequences.iter().any(|s| s == "AVDTFLR"));
        assert!(sequences.iter().all(|s| !s.contains('X')));
    }

    #[test]
    fn target_wins() {
        let search = search(builder());
        let fasta = Fasta::parse(FASTA, "rev_");

        let target = search
            .candidates(&fasta.proteins[0])
            .find(|c| c.peptide.sequence() == "LLSAMPLEK")
            .unwrap();
        let fragments = search
            .ion_series
            .compute_fragments(&target.residue_masses, 2);
        let raw = RawSpectrum {
            id: "scan=1".into(),
            scan: Some(1),
            precursor_mz: mz(target.monoisotopic, 2),
            precursor_charge: 2,
            mz: fragments.iter().map(|f| f.mz).collect(),
            intensity: vec![100.0; fragments.len()],
            ..Default::default()
        };
        let spectrum = search.parameters.processor.process(raw);

        let result = search.run(&fasta, vec![spectrum]).unwrap();
        assert!(result.stats.peptides > 0);
        assert!(result.stats.pairs > 0);
        assert_eq!(result.identifications.len(), 1);
        assert_eq!(result.passing, 1);

        let id = &result.passing()[0];
        assert!(!id.psm.decoy);
        assert_eq!(&*id.psm.sequence, "LLSAMPLEK");
        assert_eq!(id.q_value, 0.0);
        assert_eq!(id.psm.matched_fragments, fragments.len());

        let mut records = Vec::new();
        assert_eq!(result.export(&mut records, true).unwrap(), 1);
        assert_eq!(records[0].peptide, "LLSAMPLEK");
        assert_eq!(records[0].proteins, "sp|P1|ONE");
        assert_eq!(records[0].scan, Some(1));
        assert_eq!(records[0].rank, 1);
    }
}
