use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use super::*;
use crate::utils::{Path, SerdeFile, SerializationFormat};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
struct InverterParams {
    width: usize,
}

/// Generator of leaf inverters, which fails for zero width
fn inverter() -> Generator<InverterParams> {
    Generator::from_fn("Inverter", |p: &InverterParams| {
        if p.width == 0 {
            return Err("width must be nonzero".into());
        }
        Ok(Module::new("").input("inp", p.width).output("out", p.width))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
struct ChainParams {
    n: usize,
}

/// Generator of an `n`-deep chain of nested modules.
/// With `decrement` false, each level instantiates itself.
fn chain(decrement: bool) -> Generator<ChainParams> {
    let slot: Arc<OnceLock<Generator<ChainParams>>> = Arc::new(OnceLock::new());
    let me = slot.clone();
    let gen = Generator::from_fn("Chain", move |p: &ChainParams| {
        let mut m = Module::new("").analog("x", 1);
        if p.n > 0 {
            let this = me.get().ok_or("generator not yet created")?;
            let n = if decrement { p.n - 1 } else { p.n };
            m = m.instance(Instance::new("inner", this.call(ChainParams { n })).connect("x", "x"));
        }
        Ok(m)
    });
    let _ = slot.set(gen.clone());
    gen
}

/// Add the `ClkRst` and `Spi` bundle definitions to `design`
fn spi_bundles(design: &mut Design) -> BundleKey {
    let clk_rst = design.add_bundle(
        Bundle::new("ClkRst")
            .signal("clk", 1, PortDir::Input)
            .signal("reset", 1, PortDir::Input),
    );
    design.add_bundle(
        Bundle::new("Spi")
            .signal("sclk", 1, PortDir::Output)
            .signal("mosi", 1, PortDir::Output)
            .signal("miso", 1, PortDir::Input)
            .bundle("ctl", clk_rst, false),
    )
}

/// Host and Device leaf modules, on opposite sides of an `Spi` bundle
fn spi_endpoints(design: &mut Design, spi: BundleKey) -> (ModuleKey, ModuleKey) {
    let host = design.add_module(Module::new("Host").bundle_port("spi", spi, false));
    let dev = design.add_module(Module::new("Device").bundle_port("spi", spi, true));
    (host, dev)
}

/// Add the `Inverter`, `Buffer`, and `DoubleBuffer` hierarchy to `design`
fn buffers(design: &mut Design) -> (ModuleKey, ModuleKey, ModuleKey) {
    let prims = PrimitiveLibrary::new();
    let (pmos, nmos) = (prims.call(MosParams::pmos()), prims.call(MosParams::nmos()));
    let inv = design.add_module(
        Module::new("Inverter")
            .analog("vdd", 1)
            .analog("vss", 1)
            .analog("vin", 1)
            .analog("vout", 1)
            .instance(
                Instance::new("pmos", pmos)
                    .connect("d", "vout")
                    .connect("g", "vin")
                    .connect("s", "vdd")
                    .connect("b", "vdd"),
            )
            .instance(
                Instance::new("nmos", nmos)
                    .connect("d", "vout")
                    .connect("g", "vin")
                    .connect("s", "vss")
                    .connect("b", "vss"),
            ),
    );
    let buffer = design.add_module(
        Module::new("Buffer")
            .analog("vdd", 1)
            .analog("vss", 1)
            .analog("vin", 1)
            .analog("vout", 1)
            .instance(
                Instance::new("inv_1", inv)
                    .connect("vdd", "vdd")
                    .connect("vss", "vss")
                    .connect("vin", "vin"),
            )
            .instance(
                Instance::new("inv_2", inv)
                    .connect("vdd", "vdd")
                    .connect("vss", "vss")
                    .connect("vin", Connection::port_ref("inv_1", "vout"))
                    .connect("vout", "vout"),
            ),
    );
    let double = design.add_module(
        Module::new("DoubleBuffer")
            .analog("vdd", 1)
            .analog("vss", 1)
            .analog("vin", 1)
            .analog("vout", 1)
            .instance(
                Instance::new("buffer_1", buffer)
                    .connect("vdd", "vdd")
                    .connect("vss", "vss")
                    .connect("vin", "vin"),
            )
            .instance(
                Instance::new("buffer_2", buffer)
                    .connect("vdd", "vdd")
                    .connect("vss", "vss")
                    .connect("vin", Connection::port_ref("buffer_1", "vout"))
                    .connect("vout", "vout"),
            ),
    );
    (inv, buffer, double)
}

/// Design with two 4-bit and one 8-bit generated inverters
fn inverters() -> (Design, ModuleKey) {
    let mut design = Design::new("inverters");
    let inv = inverter();
    let top = Module::new("Top")
        .input("a4", 4)
        .output("y4a", 4)
        .output("y4b", 4)
        .input("a8", 8)
        .output("y8", 8)
        .instance(
            Instance::new("inv_a", inv.call(InverterParams { width: 4 }))
                .connect("inp", "a4")
                .connect("out", "y4a"),
        )
        .instance(
            Instance::new("inv_b", inv.call(InverterParams { width: 4 }))
                .connect("inp", "a4")
                .connect("out", "y4b"),
        )
        .instance(
            Instance::new("inv_c", inv.call(InverterParams { width: 8 }))
                .connect("inp", "a8")
                .connect("out", "y8"),
        );
    let top = design.add_module(top);
    (design, top)
}

#[test]
fn test_generator_memoization() -> ElabResult<()> {
    let (design, top) = inverters();
    let elab = elaborate(&design, top)?;

    let keys: Vec<Option<ModuleKey>> = elab.top().instances.iter().map(|i| i.of.module()).collect();
    assert_eq!(keys[0], keys[1]);
    assert_ne!(keys[0], keys[2]);
    assert_eq!(elab.module(keys[0].unwrap()).unwrap().name, "Inverter(width=4)");
    assert_eq!(elab.module(keys[2].unwrap()).unwrap().name, "Inverter(width=8)");

    // Two generated modules, then the root
    assert_eq!(elab.order().len(), 3);
    assert_eq!(elab.order().last(), Some(&top));
    Ok(())
}

#[test]
fn test_input_design_unmodified() -> ElabResult<()> {
    let (design, top) = inverters();
    let before = design.clone();
    elaborate(&design, top)?;
    assert_eq!(design, before);
    assert!(matches!(design.modules[top].instances[0].of, Of::Call(_)));
    Ok(())
}

#[test]
fn test_generator_cache_per_elaboration() -> ElabResult<()> {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let gen = Generator::from_fn("Counted", move |p: &InverterParams| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Module::new("").input("inp", p.width).output("out", p.width))
    });
    let mut design = Design::new("counted");
    let top = design.add_module(
        Module::new("Top")
            .input("a", 1)
            .output("y1", 1)
            .output("y2", 1)
            .instance(
                Instance::new("i1", gen.call(InverterParams { width: 1 }))
                    .connect("inp", "a")
                    .connect("out", "y1"),
            )
            .instance(
                Instance::new("i2", gen.call(InverterParams { width: 1 }))
                    .connect("inp", "a")
                    .connect("out", "y2"),
            ),
    );
    elaborate(&design, top)?;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    elaborate(&design, top)?;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_generator_identity() {
    let a = inverter();
    let b = inverter();
    assert_eq!(a, a.clone());
    assert_ne!(a, b);

    let p = InverterParams { width: 2 };
    assert_eq!(a.call(p.clone()), a.call(p.clone()));
    assert_ne!(a.call(p.clone()), b.call(p.clone()));
    assert_ne!(a.call(p), a.call(InverterParams { width: 3 }));
    assert_eq!(a.call(InverterParams { width: 2 }).name(), "Inverter(width=2)");
}

#[test]
fn test_unit_params() -> ElabResult<()> {
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
    struct NoParams;

    let tie = Generator::from_fn("Tie", |_: &NoParams| Ok(Module::new("").analog("x", 1)));
    let mut design = Design::new("tie");
    let top = design.add_module(
        Module::new("Top")
            .analog("x", 1)
            .instance(Instance::new("tie", tie.call(NoParams)).connect("x", "x")),
    );
    let elab = elaborate(&design, top)?;
    let key = elab.top().instances[0].of.module().unwrap();
    assert_eq!(elab.module(key).unwrap().name, "Tie");
    Ok(())
}

#[test]
fn test_generator_error() {
    let mut design = Design::new("broken");
    let top = design.add_module(
        Module::new("Top").instance(Instance::new("inv", inverter().call(InverterParams { width: 0 }))),
    );
    match elaborate(&design, top) {
        Err(ElabError::Generator {
            generator,
            params,
            source,
        }) => {
            assert_eq!(generator, "Inverter");
            assert!(params.contains("width: 0"));
            assert_eq!(source.to_string(), "width must be nonzero");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_nested_generators() -> ElabResult<()> {
    let mut design = Design::new("chain");
    let top = design.add_module(
        Module::new("Top")
            .analog("x", 1)
            .instance(Instance::new("chain", chain(true).call(ChainParams { n: 3 })).connect("x", "x")),
    );
    let elab = elaborate(&design, top)?;
    let names: Vec<&str> = elab.modules().map(|(_, m)| m.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Chain(n=0)", "Chain(n=1)", "Chain(n=2)", "Chain(n=3)", "Top"]
    );
    Ok(())
}

#[test]
fn test_generator_cycle() {
    let mut design = Design::new("chain");
    let top = design.add_module(
        Module::new("Top")
            .analog("x", 1)
            .instance(Instance::new("chain", chain(false).call(ChainParams { n: 3 })).connect("x", "x")),
    );
    match elaborate(&design, top) {
        Err(ElabError::CyclicGeneratorReference { cycle }) => {
            assert_eq!(cycle, vec!["Chain(n=3)", "Chain(n=3)"])
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
struct LevelParams {
    n: usize,
}

#[test]
fn test_mutual_generator_cycle() {
    let slot: Arc<OnceLock<Generator<LevelParams>>> = Arc::new(OnceLock::new());
    let other = slot.clone();
    let ping = Generator::from_fn("Ping", move |p: &LevelParams| {
        let pong = other.get().ok_or("generator not yet created")?;
        let call = pong.call(LevelParams { n: p.n + 1 });
        Ok(Module::new("").analog("x", 1).instance(Instance::new("pong", call).connect("x", "x")))
    });
    let back = ping.clone();
    let pong = Generator::from_fn("Pong", move |p: &LevelParams| {
        let call = back.call(LevelParams { n: p.n - 1 });
        Ok(Module::new("").analog("x", 1).instance(Instance::new("ping", call).connect("x", "x")))
    });
    let _ = slot.set(pong);

    let mut design = Design::new("pingpong");
    let top = design.add_module(
        Module::new("Top")
            .analog("x", 1)
            .instance(Instance::new("ping", ping.call(LevelParams { n: 1 })).connect("x", "x")),
    );
    match elaborate(&design, top) {
        Err(ElabError::CyclicGeneratorReference { cycle }) => {
            assert_eq!(cycle, vec!["Ping(n=1)", "Pong(n=2)", "Ping(n=1)"])
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_cycle_through_generated_module() {
    let mut design = Design::new("cycles");
    let m = design.add_module(Module::new("M"));
    let wrap = Generator::from_fn("Wrap", move |_: &LevelParams| {
        Ok(Module::new("").instance(Instance::new("m", m)))
    });
    design
        .module_mut(m)
        .unwrap()
        .instances
        .push(Instance::new("wrap", wrap.call(LevelParams { n: 1 })));
    let top = design.add_module(Module::new("Top").instance(Instance::new("m", m)));
    match elaborate(&design, top) {
        Err(ElabError::InstantiationCycle { cycle }) => {
            assert_eq!(cycle, vec!["M", "Wrap(n=1)", "M"])
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_instantiation_cycle() {
    let mut design = Design::new("cycles");
    let a = design.add_module(Module::new("A"));
    let b = design.add_module(Module::new("B").instance(Instance::new("a", a)));
    design
        .module_mut(a)
        .unwrap()
        .instances
        .push(Instance::new("b", b));
    match elaborate(&design, a) {
        Err(ElabError::InstantiationCycle { cycle }) => assert_eq!(cycle, vec!["A", "B", "A"]),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_transitive_cycle() {
    let mut design = Design::new("cycles");
    let a = design.add_module(Module::new("A"));
    let c = design.add_module(Module::new("C").instance(Instance::new("a", a)));
    let b = design.add_module(Module::new("B").instance(Instance::new("c", c)));
    design
        .module_mut(a)
        .unwrap()
        .instances
        .push(Instance::new("b", b));
    let top = design.add_module(Module::new("Top").instance(Instance::new("a", a)));
    match elaborate(&design, top) {
        Err(ElabError::InstantiationCycle { cycle }) => {
            assert_eq!(cycle, vec!["A", "B", "C", "A"])
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_invalid_root() {
    let mut design = Design::new("empty");
    let key = design.add_module(Module::new("Gone"));
    design.modules.remove(key);
    assert!(matches!(
        elaborate(&design, key),
        Err(ElabError::InvalidReference { .. })
    ));
}

#[test]
fn test_unconnected_port() {
    let mut design = Design::new("dangling");
    let res = design.add_module(Module::new("Res").analog("p", 1).analog("n", 1));
    let top = design.add_module(
        Module::new("Top")
            .analog("vdd", 1)
            .instance(Instance::new("r", res).connect("p", "vdd")),
    );
    let err = elaborate(&design, top).unwrap_err();
    assert_eq!(
        err.violations(),
        &[Violation {
            path: Path::module("Top").instance("r").port("n"),
            kind: ViolationKind::UnconnectedPort,
        }]
    );
    assert_eq!(err.violations()[0].path.to_string(), "Top.r.n");
}

#[test]
fn test_multiple_drivers() {
    let mut design = Design::new("contention");
    let inv = inverter();
    let top = design.add_module(
        Module::new("Top")
            .input("a", 1)
            .output("y", 1)
            .instance(
                Instance::new("inv1", inv.call(InverterParams { width: 1 }))
                    .connect("inp", "a")
                    .connect("out", "y"),
            )
            .instance(
                Instance::new("inv2", inv.call(InverterParams { width: 1 }))
                    .connect("inp", "a")
                    .connect("out", "y"),
            ),
    );
    let err = elaborate(&design, top).unwrap_err();
    let top = Path::module("Top");
    assert_eq!(
        err.violations(),
        &[Violation {
            path: top.port("y"),
            kind: ViolationKind::MultipleDrivers {
                drivers: vec![top.instance("inv1").port("out"), top.instance("inv2").port("out")],
            },
        }]
    );
}

#[test]
fn test_arity_mismatch() {
    let mut design = Design::new("arity");
    let top = design.add_module(
        Module::new("Top").input("a8", 8).output("y", 4).instance(
            Instance::new("inv", inverter().call(InverterParams { width: 4 }))
                .connect("inp", "a8")
                .connect("out", "y"),
        ),
    );
    let err = elaborate(&design, top).unwrap_err();
    assert_eq!(
        err.violations(),
        &[Violation {
            path: Path::module("Top").instance("inv").port("inp"),
            kind: ViolationKind::ArityMismatch {
                port_width: 4,
                signal_width: 8,
            },
        }]
    );
}

#[test]
fn test_undriven() -> ElabResult<()> {
    let mut design = Design::new("undriven");
    let top = design.add_module(
        Module::new("Top").output("y", 1).signal("s", 1).instance(
            Instance::new("inv", inverter().call(InverterParams { width: 1 }))
                .connect("inp", "s")
                .connect("out", "y"),
        ),
    );
    let err = elaborate(&design, top).unwrap_err();
    assert_eq!(
        err.violations(),
        &[Violation {
            path: Path::module("Top").signal("s"),
            kind: ViolationKind::Undriven,
        }]
    );
    // And with driver-checking disabled
    let opts = ElabOptions {
        require_drivers: false,
        ..Default::default()
    };
    Elaborator::new(opts).elaborate(&design, top)?;
    Ok(())
}

#[test]
fn test_unconnected_output_not_undriven() {
    let mut design = Design::new("dangling");
    let top = design.add_module(
        Module::new("Top")
            .input("a", 1)
            .output("y", 1)
            .output("z", 2)
            .instance(Instance::new("inv", inverter().call(InverterParams { width: 1 })).connect("inp", "a")),
    );
    let err = elaborate(&design, top).unwrap_err();
    let top = Path::module("Top");
    // `y` may have been meant for `inv.out`, while nothing could drive `z`
    assert_eq!(
        err.violations(),
        &[
            Violation {
                path: top.instance("inv").port("out"),
                kind: ViolationKind::UnconnectedPort,
            },
            Violation {
                path: top.port("z"),
                kind: ViolationKind::Undriven,
            },
        ]
    );
}

#[test]
fn test_violations_collected() {
    let mut design = Design::new("many");
    let res = design.add_module(Module::new("Res").analog("p", 1).analog("n", 1));
    let top = design.add_module(
        Module::new("Top")
            .analog("x", 1)
            .signal("z", 0)
            .instance(Instance::new("r1", res).connect("p", "x"))
            .instance(Instance::new("r2", res).connect("p", "x").connect("q", "x").connect("n", "nope")),
    );
    let err = elaborate(&design, top).unwrap_err();
    let top = Path::module("Top");
    let kinds: Vec<(String, ViolationKind)> = err
        .violations()
        .iter()
        .map(|v| (v.path.to_string(), v.kind.clone()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (top.signal("z").to_string(), ViolationKind::ZeroWidth),
            ("Top.r1.n".to_string(), ViolationKind::UnconnectedPort),
            ("Top.r2.q".to_string(), ViolationKind::UnknownPort),
            (
                "Top.r2.n".to_string(),
                ViolationKind::UnknownSignal { name: "nope".into() }
            ),
        ]
    );
}

#[test]
fn test_bundle_name_collisions() {
    let mut design = Design::new("collisions");
    let spi = spi_bundles(&mut design);
    let (host, _) = spi_endpoints(&mut design, spi);
    let mut top = Module::new("Top")
        .analog("spi", 1)
        .bundle("bus", spi, false)
        .instance(Instance::new("bus", host));
    top.bundle_ports.insert(
        "spi".into(),
        BundleInstance {
            name: "spi".into(),
            of: spi,
            flipped: false,
        },
    );
    let top = design.add_module(top);
    let err = elaborate(&design, top).unwrap_err();
    let top = Path::module("Top");
    assert_eq!(
        err.violations(),
        &[
            Violation {
                path: top.port("spi"),
                kind: ViolationKind::DuplicateName { name: "spi".into() },
            },
            Violation {
                path: top.instance("bus"),
                kind: ViolationKind::DuplicateName { name: "bus".into() },
            },
        ]
    );
}

#[test]
fn test_redeclared_names() {
    let m = Module::new("M")
        .input("a", 4)
        .output("a", 1)
        .signal("s", 2)
        .signal("s", 8)
        .bundle("s", BundleKey::default(), false);
    // First declarations are kept
    assert_eq!(m.ports["a"], Port::new("a", 4, PortDir::Input));
    assert_eq!(m.signals["s"].width, 2);
    assert!(m.bundles.is_empty());

    let mut design = Design::new("redeclared");
    let key = design.add_module(m);
    let err = elaborate(&design, key).unwrap_err();
    let m = Path::module("M");
    assert_eq!(
        err.violations(),
        &[
            Violation {
                path: m.port("a"),
                kind: ViolationKind::DuplicateName { name: "a".into() },
            },
            Violation {
                path: m.signal("s"),
                kind: ViolationKind::DuplicateName { name: "s".into() },
            },
            Violation {
                path: m.bundle("s"),
                kind: ViolationKind::DuplicateName { name: "s".into() },
            },
        ]
    );
}

#[test]
fn test_bundle_flattening() -> ElabResult<()> {
    let mut design = Design::new("spi");
    let spi = spi_bundles(&mut design);
    let (host, dev) = spi_endpoints(&mut design, spi);
    let top = design.add_module(
        Module::new("Top")
            .bundle("spi", spi, false)
            .instance(Instance::new("host", host).connect("spi", Connection::bundle("spi")))
            .instance(Instance::new("dev", dev).connect("spi", Connection::bundle("spi"))),
    );
    let elab = elaborate(&design, top)?;

    let t = elab.top();
    assert!(t.bundles.is_empty());
    let signals: Vec<&str> = t.signals.keys().map(String::as_str).collect();
    assert_eq!(
        signals,
        vec!["spi_sclk", "spi_mosi", "spi_miso", "spi_ctl_clk", "spi_ctl_reset"]
    );
    for inst in t.instances.iter() {
        assert_eq!(inst.conns.len(), 5);
        assert_eq!(inst.conns["spi_ctl_reset"], Connection::signal("spi_ctl_reset"));
    }

    let host = elab.module(host).unwrap();
    assert!(host.bundle_ports.is_empty());
    assert_eq!(host.ports["spi_sclk"].dir, PortDir::Output);
    assert_eq!(host.ports["spi_miso"].dir, PortDir::Input);
    assert_eq!(host.ports["spi_ctl_clk"].dir, PortDir::Input);
    let dev = elab.module(dev).unwrap();
    assert_eq!(dev.ports["spi_sclk"].dir, PortDir::Input);
    assert_eq!(dev.ports["spi_miso"].dir, PortDir::Output);
    assert_eq!(dev.ports["spi_ctl_clk"].dir, PortDir::Output);
    Ok(())
}

#[test]
fn test_bundle_leaves() -> Result<(), MismatchKind> {
    let mut design = Design::new("leaves");
    let spi = spi_bundles(&mut design);
    let leaves = bundle::leaves(&design.bundles, spi, true)?;
    let paths: Vec<String> = leaves.iter().map(|l| l.path.join(".")).collect();
    assert_eq!(paths, vec!["sclk", "mosi", "miso", "ctl.clk", "ctl.reset"]);
    assert_eq!(leaves[0].dir, PortDir::Input);
    assert_eq!(leaves[2].dir, PortDir::Output);
    assert_eq!(leaves[3].dir, PortDir::Output);

    // Flipped nested roles flip again
    let clk_rst = design.bundles.iter().find(|(_, b)| b.name == "ClkRst").unwrap().0;
    let outer = design.add_bundle(Bundle::new("Outer").bundle("inner", clk_rst, true));
    let leaves = bundle::leaves(&design.bundles, outer, true)?;
    assert_eq!(leaves[0].dir, PortDir::Input);
    Ok(())
}

#[test]
fn test_recursive_bundle() {
    let mut design = Design::new("recursive");
    let key = design.add_bundle(Bundle::new("Loop"));
    design.bundles[key].roles.insert(
        "again".into(),
        Role::Bundle {
            of: key,
            flipped: false,
        },
    );
    assert_eq!(
        bundle::leaves(&design.bundles, key, false),
        Err(MismatchKind::RecursiveDefinition)
    );
}

#[test]
fn test_bundle_mismatches() {
    let mut design = Design::new("mismatch");
    let spi = spi_bundles(&mut design);
    let lite = design.add_bundle(
        Bundle::new("SpiLite")
            .signal("sclk", 2, PortDir::Output)
            .signal("mosi", 1, PortDir::Input)
            .signal("cs", 1, PortDir::Output),
    );
    let (host, _) = spi_endpoints(&mut design, spi);
    let top = design.add_module(
        Module::new("Top")
            .bundle("lite", lite, false)
            .instance(Instance::new("host", host).connect("spi", Connection::bundle("lite"))),
    );
    let err = elaborate(&design, top).unwrap_err();
    let found: Vec<(String, BundleViolationKind)> = err
        .bundle_violations()
        .iter()
        .map(|v| (v.path.to_string(), v.kind.clone()))
        .collect();
    use BundleViolationKind::*;
    assert_eq!(
        found,
        vec![
            (
                "Top.host.spi.sclk".to_string(),
                WidthMismatch { child: 1, parent: 2 }
            ),
            (
                "Top.host.spi.mosi".to_string(),
                DirectionConflict {
                    child: PortDir::Output,
                    parent: PortDir::Input
                }
            ),
            (
                "Top.host.spi.miso".to_string(),
                BundleMismatch(MismatchKind::MissingRole)
            ),
            (
                "Top.host.spi.ctl".to_string(),
                BundleMismatch(MismatchKind::MissingRole)
            ),
            (
                "Top.host.spi.cs".to_string(),
                BundleMismatch(MismatchKind::ExtraRole)
            ),
        ]
    );
}

#[test]
fn test_bundle_port_passthrough() -> ElabResult<()> {
    let mut design = Design::new("passthrough");
    let spi = spi_bundles(&mut design);
    let (host, dev) = spi_endpoints(&mut design, spi);
    let wrapper = design.add_module(
        Module::new("Wrapper")
            .bundle_port("spi", spi, false)
            .instance(Instance::new("host", host).connect("spi", Connection::bundle("spi"))),
    );
    let top = design.add_module(
        Module::new("Top")
            .bundle("spi", spi, false)
            .instance(Instance::new("wrapper", wrapper).connect("spi", Connection::bundle("spi")))
            .instance(Instance::new("dev", dev).connect("spi", Connection::bundle("spi"))),
    );
    let elab = elaborate(&design, top)?;
    let wrapper = elab.module(wrapper).unwrap();
    assert_eq!(wrapper.ports.len(), 5);
    assert_eq!(wrapper.ports["spi_mosi"].dir, PortDir::Output);
    assert_eq!(
        wrapper.instances[0].conns["spi_mosi"],
        Connection::signal("spi_mosi")
    );
    Ok(())
}

#[test]
fn test_bundle_port_passthrough_flipped() {
    let mut design = Design::new("passthrough");
    let spi = spi_bundles(&mut design);
    let (host, _) = spi_endpoints(&mut design, spi);
    let wrapper = design.add_module(
        Module::new("Wrapper")
            .bundle_port("spi", spi, true)
            .instance(Instance::new("host", host).connect("spi", Connection::bundle("spi"))),
    );
    let err = elaborate(&design, wrapper).unwrap_err();
    let violations = err.bundle_violations();
    assert_eq!(violations.len(), 5);
    assert!(violations
        .iter()
        .all(|v| matches!(v.kind, BundleViolationKind::DirectionConflict { .. })));
    assert_eq!(violations[4].path.to_string(), "Wrapper.host.spi.ctl.reset");
}

#[test]
fn test_bundle_connection_kinds() {
    let mut design = Design::new("kinds");
    let spi = spi_bundles(&mut design);
    let (host, _) = spi_endpoints(&mut design, spi);
    let res = design.add_module(Module::new("Res").analog("p", 1).analog("n", 1));
    let top = design.add_module(
        Module::new("Top")
            .analog("x", 1)
            .bundle("spi", spi, false)
            .instance(Instance::new("host", host).connect("spi", "x"))
            .instance(
                Instance::new("res", res)
                    .connect("p", Connection::bundle("spi"))
                    .connect("n", "x"),
            )
            .instance(Instance::new("host2", host).connect("spi", Connection::bundle("nope"))),
    );
    let err = elaborate(&design, top).unwrap_err();
    let kinds: Vec<BundleViolationKind> = err.bundle_violations().iter().map(|v| v.kind.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            BundleViolationKind::BundleMismatch(MismatchKind::NotABundle),
            BundleViolationKind::BundleMismatch(MismatchKind::ScalarPort),
            BundleViolationKind::BundleMismatch(MismatchKind::UnknownBundle { name: "nope".into() }),
        ]
    );
}

#[test]
fn test_port_refs() -> ElabResult<()> {
    let mut design = Design::new("buffers");
    let (_, buffer, double) = buffers(&mut design);
    let elab = elaborate(&design, double)?;

    let buffer = elab.module(buffer).unwrap();
    assert_eq!(buffer.signals["inv_1_vout"].width, 1);
    assert_eq!(buffer.instances[0].conns["vout"], Connection::signal("inv_1_vout"));
    assert_eq!(buffer.instances[1].conns["vin"], Connection::signal("inv_1_vout"));

    let top = elab.top();
    assert!(top.signals.contains_key("buffer_1_vout"));
    assert_eq!(top.instances[1].conns["vin"], Connection::signal("buffer_1_vout"));

    // One module per distinct set of primitive parameters
    let mos: Vec<&str> = elab
        .modules()
        .map(|(_, m)| m.name.as_str())
        .filter(|n| n.starts_with("Mos"))
        .collect();
    assert_eq!(
        mos,
        vec!["Mos(npar=1,mult=1,tp=PMOS,vth=STD)", "Mos(npar=1,mult=1,tp=NMOS,vth=STD)"]
    );
    Ok(())
}

#[test]
fn test_port_ref_shares_existing_connection() -> ElabResult<()> {
    let mut design = Design::new("share");
    let inv = inverter();
    let top = design.add_module(
        Module::new("Top")
            .input("a", 1)
            .output("y", 1)
            .signal("mid", 1)
            .instance(
                Instance::new("inv1", inv.call(InverterParams { width: 1 }))
                    .connect("inp", "a")
                    .connect("out", "mid"),
            )
            .instance(
                Instance::new("inv2", inv.call(InverterParams { width: 1 }))
                    .connect("inp", Connection::port_ref("inv1", "out"))
                    .connect("out", "y"),
            ),
    );
    let elab = elaborate(&design, top)?;
    assert_eq!(elab.top().instances[1].conns["inp"], Connection::signal("mid"));
    assert!(!elab.top().signals.contains_key("inv1_out"));
    Ok(())
}

#[test]
fn test_port_ref_unknown_instance() {
    let mut design = Design::new("portref");
    let top = design.add_module(
        Module::new("Top").output("y", 1).instance(
            Instance::new("inv", inverter().call(InverterParams { width: 1 }))
                .connect("inp", Connection::port_ref("ghost", "out"))
                .connect("out", "y"),
        ),
    );
    let err = elaborate(&design, top).unwrap_err();
    assert_eq!(
        err.violations(),
        &[Violation {
            path: Path::module("Top").instance("inv").port("inp"),
            kind: ViolationKind::UnknownInstance { name: "ghost".into() },
        }]
    );
}

/// Three inverters, the third connected to the second's input, itself a port-reference.
/// With `inv3_first`, the third is declared ahead of the second.
fn chained_refs(inv3_first: bool) -> (Design, ModuleKey) {
    let inv = inverter();
    let inv1 = Instance::new("inv1", inv.call(InverterParams { width: 1 }))
        .connect("inp", "a")
        .connect("out", "y1");
    let inv2 = Instance::new("inv2", inv.call(InverterParams { width: 1 }))
        .connect("inp", Connection::port_ref("inv1", "out"))
        .connect("out", "y2");
    let inv3 = Instance::new("inv3", inv.call(InverterParams { width: 1 }))
        .connect("inp", Connection::port_ref("inv2", "inp"))
        .connect("out", "y3");
    let top = Module::new("Top")
        .input("a", 1)
        .output("y1", 1)
        .output("y2", 1)
        .output("y3", 1)
        .instance(inv1);
    let top = match inv3_first {
        true => top.instance(inv3).instance(inv2),
        false => top.instance(inv2).instance(inv3),
    };
    let mut design = Design::new("chained");
    let top = design.add_module(top);
    (design, top)
}

#[test]
fn test_chained_port_refs() {
    for inv3_first in [false, true] {
        let (design, top) = chained_refs(inv3_first);
        let err = elaborate(&design, top).unwrap_err();
        assert_eq!(
            err.violations(),
            &[Violation {
                path: Path::module("Top").instance("inv3").port("inp"),
                kind: ViolationKind::UnresolvedConnection,
            }]
        );
    }
}

#[test]
fn test_instance_arrays() -> ElabResult<()> {
    let mut design = Design::new("arrays");
    let inv = inverter();
    let arr = InstanceArray::new("invs", inv.call(InverterParams { width: 1 }), 3)
        .connect(0, "inp", "a")
        .connect(0, "out", "y0")
        .connect(1, "inp", "a")
        .connect(1, "out", "y1")
        .connect(2, "inp", "a")
        .connect(2, "out", "y2");
    let top = design.add_module(
        Module::new("Top")
            .input("a", 1)
            .output("y0", 1)
            .output("y1", 1)
            .output("y2", 1)
            .array(arr),
    );
    let elab = elaborate(&design, top)?;
    let arr = &elab.top().arrays[0];
    assert_eq!(arr.len(), 3);
    assert_eq!(arr[1]["out"], Connection::signal("y1"));
    let key = arr.of.module().unwrap();
    assert_eq!(elab.module(key).unwrap().name, "Inverter(width=1)");
    Ok(())
}

#[test]
fn test_instance_array_unconnected() {
    let mut design = Design::new("arrays");
    let arr = InstanceArray::new("invs", inverter().call(InverterParams { width: 1 }), 3)
        .connect(0, "inp", "a")
        .connect(0, "out", "y0")
        .connect(1, "inp", "a")
        .connect(1, "out", "y1")
        .connect(2, "inp", "a");
    let top = design.add_module(
        Module::new("Top")
            .input("a", 1)
            .output("y0", 1)
            .output("y1", 1)
            .array(arr),
    );
    let err = elaborate(&design, top).unwrap_err();
    assert_eq!(err.violations().len(), 1);
    assert_eq!(err.violations()[0].path.to_string(), "Top.invs[2].out");
}

#[test]
fn test_idempotence() -> ElabResult<()> {
    let mut design = Design::new("idempotence");
    let spi = spi_bundles(&mut design);
    let (host, dev) = spi_endpoints(&mut design, spi);
    let (_, _, double) = buffers(&mut design);
    let top = design.add_module(
        Module::new("Top")
            .analog("vdd", 1)
            .analog("vss", 1)
            .analog("vin", 1)
            .analog("vout", 1)
            .bundle("spi", spi, false)
            .instance(Instance::new("host", host).connect("spi", Connection::bundle("spi")))
            .instance(Instance::new("dev", dev).connect("spi", Connection::bundle("spi")))
            .instance(
                Instance::new("bufs", double)
                    .connect("vdd", "vdd")
                    .connect("vss", "vss")
                    .connect("vin", "vin")
                    .connect("vout", "vout"),
            ),
    );
    let once = elaborate(&design, top)?;
    let twice = elaborate(once.design(), once.root())?;
    assert_eq!(once, twice);
    Ok(())
}

#[test]
fn test_flatten_buffer() -> ElabResult<()> {
    let mut design = Design::new("buffers");
    let (inv, buffer, _) = buffers(&mut design);
    let elab = elaborate(&design, buffer)?;
    assert!(is_flat(&elab, inv));
    assert!(!is_flat(&elab, buffer));

    let flat = flatten(&elab, buffer, &ElabOptions::default())?;
    assert_eq!(flat.name, "Buffer_flat");
    let names: Vec<&str> = flat.instances.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["inv_1:pmos", "inv_1:nmos", "inv_2:pmos", "inv_2:nmos"]);
    let ports: Vec<&str> = flat.ports.keys().map(String::as_str).collect();
    assert_eq!(ports, vec!["vdd", "vss", "vin", "vout"]);
    let signals: Vec<&str> = flat.signals.keys().map(String::as_str).collect();
    assert_eq!(signals, vec!["inv_1_vout"]);

    assert_eq!(flat.instances[0].conns["d"], Connection::signal("inv_1_vout"));
    assert_eq!(flat.instances[2].conns["g"], Connection::signal("inv_1_vout"));
    assert_eq!(flat.instances[3].conns["d"], Connection::signal("vout"));

    // Already-flat modules are returned unchanged
    assert_eq!(flatten(&elab, inv, &ElabOptions::default())?.name, "Inverter");
    Ok(())
}

#[test]
fn test_flatten_double_buffer() -> ElabResult<()> {
    let mut design = Design::new("buffers");
    let (_, _, double) = buffers(&mut design);
    let elab = elaborate(&design, double)?;
    let flat = Elaborator::default().flatten(&elab, double)?;

    assert_eq!(flat.name, "DoubleBuffer_flat");
    let names: Vec<&str> = flat.instances.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "buffer_1:inv_1:pmos",
            "buffer_1:inv_1:nmos",
            "buffer_1:inv_2:pmos",
            "buffer_1:inv_2:nmos",
            "buffer_2:inv_1:pmos",
            "buffer_2:inv_1:nmos",
            "buffer_2:inv_2:pmos",
            "buffer_2:inv_2:nmos",
        ]
    );
    let signals: HashSet<&str> = flat.signals.keys().map(String::as_str).collect();
    let expected: HashSet<&str> = ["buffer_1:inv_1_vout", "buffer_2:inv_1_vout", "buffer_1_vout"]
        .into_iter()
        .collect();
    assert_eq!(signals, expected);

    // The second buffer's input is the first buffer's output
    assert_eq!(flat.instances[2].conns["d"], Connection::signal("buffer_1_vout"));
    assert_eq!(flat.instances[4].conns["g"], Connection::signal("buffer_1_vout"));
    Ok(())
}

#[test]
fn test_primitive_params() -> ElabResult<()> {
    let prims = PrimitiveLibrary::new();
    let r1k = || prims.call(ResistorParams { r: "1k".into() });
    let vdc = DcVoltageSourceParams {
        dc: "1.8".into(),
        ..Default::default()
    };
    let mut design = Design::new("divider");
    let top = design.add_module(
        Module::new("Top")
            .analog("vdd", 1)
            .analog("vss", 1)
            .signal("mid", 1)
            .instance(Instance::new("vsrc", prims.call(vdc)).connect("p", "vdd").connect("n", "vss"))
            .instance(Instance::new("r1", r1k()).connect("p", "vdd").connect("n", "mid"))
            .instance(Instance::new("r2", r1k()).connect("p", "mid").connect("n", "vss"))
            .instance(
                Instance::new("r3", prims.call(ResistorParams { r: "2k".into() }))
                    .connect("p", "mid")
                    .connect("n", "vss"),
            ),
    );
    let elab = elaborate(&design, top)?;
    let keys: Vec<ModuleKey> = elab.top().instances.iter().filter_map(|i| i.of.module()).collect();
    assert_eq!(keys[1], keys[2]);
    assert_ne!(keys[2], keys[3]);

    let res = elab.module(keys[1]).unwrap();
    assert_eq!(res.name, "IdealResistor(r=1k)");
    assert_eq!(res.params["r"], "1k");
    let ports: Vec<&str> = res.ports.keys().map(String::as_str).collect();
    assert_eq!(ports, vec!["p", "n"]);
    assert_eq!(elab.module(keys[0]).unwrap().name, "DcVoltageSource(dc=1.8)");

    let snap = elab.export(&mut SnapshotExporter)?;
    let r2k = snap.modules.iter().find(|m| m.name == "IdealResistor(r=2k)").unwrap();
    assert_eq!(r2k.params["r"], "2k");
    assert!(snap.modules.last().unwrap().params.is_empty());
    Ok(())
}

#[test]
fn test_options_from_toml() -> ElabResult<()> {
    let opts: ElabOptions = SerializationFormat::Toml.from_str(
        r#"
        bundle_separator = "__"
        require_drivers = false
        "#,
    )?;
    assert_eq!(opts.bundle_separator, "__");
    assert_eq!(opts.portref_separator, "_");
    assert_eq!(opts.hierarchy_separator, ":");
    assert!(!opts.require_drivers);

    let mut design = Design::new("spi");
    let spi = spi_bundles(&mut design);
    let (host, _) = spi_endpoints(&mut design, spi);
    let top = design.add_module(
        Module::new("Top")
            .bundle("spi", spi, false)
            .instance(Instance::new("host", host).connect("spi", Connection::bundle("spi"))),
    );
    let elab = Elaborator::new(opts).elaborate(&design, top)?;
    assert!(elab.top().signals.contains_key("spi__ctl__clk"));

    let schema = serde_json::to_string(&ElabOptions::schema()).unwrap();
    assert!(schema.contains("hierarchy_separator"));
    Ok(())
}

#[test]
fn test_snapshot_export() -> ElabResult<()> {
    let (design, top) = inverters();
    let elab = elaborate(&design, top)?;
    let snap = elab.export(&mut SnapshotExporter)?;

    assert_eq!(snap.top, "Top");
    let names: Vec<&str> = snap.modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Inverter(width=4)", "Inverter(width=8)", "Top"]);
    let top = &snap.modules[2];
    assert_eq!(top.instances[1].module, "Inverter(width=4)");
    assert_eq!(top.instances[2].conns["inp"], "a8");
    assert_eq!(top.ports[1].dir, "output");

    let fname = std::env::temp_dir().join("hdl21_test_snapshot_export.json");
    snap.save(SerializationFormat::Json, &fname)?;
    assert_eq!(Snapshot::open_path(&fname)?, snap);
    std::fs::remove_file(&fname).unwrap();
    Ok(())
}

#[test]
fn test_snapshot_duplicate_names() -> ElabResult<()> {
    let mut design = Design::new("dupes");
    let a = design.add_module(Module::new("Leaf").analog("p", 1));
    let b = design.add_module(Module::new("Leaf").analog("p", 1));
    let top = design.add_module(
        Module::new("Top")
            .analog("x", 1)
            .instance(Instance::new("a", a).connect("p", "x"))
            .instance(Instance::new("b", b).connect("p", "x")),
    );
    let elab = elaborate(&design, top)?;
    match SnapshotExporter.export(&elab) {
        Err(ElabError::Export(msg)) => assert!(msg.contains("Leaf")),
        other => panic!("unexpected result: {:?}", other),
    }
    Ok(())
}
