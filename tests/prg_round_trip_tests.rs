//! PRG textual/binary round trips and on-disk index round trips.

extern crate weaver_genome;

use weaver_genome::fm_index::FmIndex;
use weaver_genome::prg::codec::{
    ints_to_bracketed_string, load_prg, parse_bracketed_prg, parse_numbered_prg, write_packed_prg,
    Endianness,
};
use weaver_genome::prg::prg_string::PrgString;
use weaver_genome::prg::PrgInfo;
use weaver_genome::quasimap::search::search_read_backwards;

#[test]
fn bracketed_decode_encode_is_identity() {
    for prg in [
        "A[T,G]A",
        "AATAA[CCC[A,G],T]AA",
        "GGGGG[CCC,]GG",
        "[A,]A[[G,A]A,C,T]",
        "ATCGGC[TC[A,G]TC,GG[T,G]GG]AT",
    ] {
        let ints = parse_bracketed_prg(prg).unwrap();
        assert_eq!(ints_to_bracketed_string(&ints).unwrap(), prg);
    }
}

#[test]
fn numbered_form_round_trips_modulo_renaming() {
    // Site IDs 7/9 get renamed 5/7 through the bracketed form
    let ints = parse_numbered_prg("aa7g8c8tt9a10c10").unwrap();
    let bracketed = ints_to_bracketed_string(&ints).unwrap();
    assert_eq!(bracketed, "AA[G,C]TT[A,C]");
    let renamed = parse_bracketed_prg(&bracketed).unwrap();
    assert_eq!(
        renamed,
        parse_numbered_prg("aa5g6c6tt7a8c8").unwrap()
    );
}

#[test]
fn text_prg_files_are_autodetected() {
    let dir = tempfile::tempdir().unwrap();

    let bracketed_path = dir.path().join("prg.txt");
    std::fs::write(&bracketed_path, "AATAA[C,G]AA").unwrap();
    let from_bracketed = load_prg(&bracketed_path, Endianness::Little).unwrap();
    assert_eq!(from_bracketed, parse_bracketed_prg("AATAA[C,G]AA").unwrap());

    let numbered_path = dir.path().join("prg_numbered.txt");
    std::fs::write(&numbered_path, "aataa5c6g6aa").unwrap();
    let from_numbered = load_prg(&numbered_path, Endianness::Little).unwrap();
    assert_eq!(from_numbered, from_bracketed);
}

#[test]
fn packed_prg_autodetected_and_equal_to_text() {
    let dir = tempfile::tempdir().unwrap();
    let ints = parse_bracketed_prg("AATAA[C,G]AA").unwrap();
    let packed_path = dir.path().join("prg.bin");
    write_packed_prg(&packed_path, &ints, Endianness::Little).unwrap();
    assert_eq!(load_prg(&packed_path, Endianness::Little).unwrap(), ints);
}

#[test]
fn reloaded_index_maps_reads_identically() {
    let ints = parse_bracketed_prg("AATAA[C,G]AA[C,G]AA").unwrap();
    let prg = PrgString::new(ints).unwrap();
    let built = PrgInfo::from_prg_string(prg.clone()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let index_path = dir.path().join("fm_index.bin");
    built.fm_index.write(&index_path, Endianness::Little).unwrap();

    let reloaded = FmIndex::read(&index_path).unwrap();
    let reloaded_info = PrgInfo::new(prg, reloaded).unwrap();

    let read = weaver_genome::prg::codec::encode_dna_bases(b"AATAACAACAA").unwrap();
    let original_states = search_read_backwards(&read, &built).unwrap();
    let reloaded_states = search_read_backwards(&read, &reloaded_info).unwrap();
    assert_eq!(original_states, reloaded_states);
    assert_eq!(original_states.len(), 1);
}
