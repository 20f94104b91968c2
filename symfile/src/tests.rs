use crate::model::{Context, ModelType, ModelTypeSystem};
use crate::testing::{LineDataBuilder, PdbBuilder, SymbolsBuilder};
use crate::type_system::{
    AccessType, CallingConv, MsInheritance, PointerKind, Qualifiers, RecordMetadata, TagKind,
    TypeSystem,
};
use crate::*;
use hex_literal::hex;
use ms_codeview::types::{CallingConvention, Leaf, TypeIndex};
use pretty_hex::PrettyHex;
use std::rc::Rc;

#[static_init::dynamic]
static INIT_LOGGER: () = {
    tracing_subscriber::fmt::fmt()
        .compact()
        .with_max_level(tracing_subscriber::filter::LevelFilter::TRACE)
        .with_level(false)
        .with_file(true)
        .with_line_number(true)
        .with_test_writer()
        .without_time()
        .with_ansi(false)
        .init();
};

const LOAD_ADDRESS: u64 = 0x1_4000_0000;

fn open(image: &[u8]) -> SymbolFile<'_, ModelTypeSystem> {
    SymbolFile::open(
        image,
        ModelTypeSystem::default(),
        SymbolFileOptions::default().with_load_address(LOAD_ADDRESS),
    )
    .unwrap()
}

fn tpi(ti: TypeIndex) -> PdbTypeSymId {
    PdbTypeSymId::tpi(ti)
}

#[test]
fn forward_and_full_declarations_are_one_type() {
    let mut b = PdbBuilder::new();
    let fwd = b.tpi.struct_forward(Leaf::LF_STRUCTURE, "S", Some(".?AUS@@"));
    let fl = b.tpi.field_list(|f| f.member(TypeIndex::T_INT4, 0, "x"));
    let full = b.tpi.struct_full(Leaf::LF_STRUCTURE, "S", Some(".?AUS@@"), fl, 4);
    let image = b.build();

    // forward first
    let mut sf = open(&image);
    let a = sf.get_or_create_type(tpi(fwd)).unwrap();
    let b_ = sf.get_or_create_type(tpi(full)).unwrap();
    assert!(Rc::ptr_eq(&a, &b_));
    assert_eq!(a.uid, PdbSymUid::from(tpi(full)));
    assert_eq!(a.name, "S");
    assert_eq!(a.byte_size, 4);
    assert_eq!(a.resolve_state(), ResolveState::Forward);

    let tag = sf.type_system().tag(a.compiler_type);
    assert!(tag.started);
    assert!(tag.has_external_storage);
    assert_eq!(tag.context, Context::TranslationUnit);
    assert_eq!(sf.type_system().tags.len(), 1);

    // full first
    let mut sf = open(&image);
    let b_ = sf.get_or_create_type(tpi(full)).unwrap();
    let a = sf.get_or_create_type(tpi(fwd)).unwrap();
    assert!(Rc::ptr_eq(&a, &b_));
    assert_eq!(sf.type_system().tags.len(), 1);

    let found = sf.find_types_by_name("S", 0);
    assert_eq!(found.len(), 1);
    assert!(Rc::ptr_eq(&found[0], &a));
}

#[test]
fn forward_reference_without_definition() {
    let mut b = PdbBuilder::new();
    let fwd = b.tpi.struct_forward(Leaf::LF_CLASS, "Opaque", Some(".?AVOpaque@@"));
    let image = b.build();

    let mut sf = open(&image);
    let t = sf.get_or_create_type(tpi(fwd)).unwrap();
    assert_eq!(t.byte_size, 0);
    assert!(!sf.complete_type(&t.compiler_type));
    assert_eq!(t.resolve_state(), ResolveState::Forward);
    assert_eq!(sf.type_system().tag(t.compiler_type).times_completed, 0);
}

#[test]
fn self_referential_struct() {
    let mut b = PdbBuilder::new();
    let fwd = b.tpi.struct_forward(Leaf::LF_STRUCTURE, "Node", Some(".?AUNode@@"));
    let ptr = b.tpi.pointer(fwd, 0, 8);
    let fl = b.tpi.field_list(|f| {
        f.member(ptr, 0, "next");
        f.member(TypeIndex::T_INT4, 8, "value");
    });
    let full = b.tpi.struct_full(Leaf::LF_STRUCTURE, "Node", Some(".?AUNode@@"), fl, 16);
    let image = b.build();

    let mut sf = open(&image);
    let node = sf.get_or_create_type(tpi(full)).unwrap();
    assert!(sf.complete_type(&node.compiler_type));
    assert_eq!(node.resolve_state(), ResolveState::Full);

    let ts = sf.type_system();
    let tag = ts.tag(node.compiler_type);
    assert_eq!(tag.times_completed, 1);
    assert_eq!(tag.fields.len(), 2);
    assert_eq!(tag.fields[0].name, "next");
    assert_eq!(
        ts.types[tag.fields[0].ty],
        ModelType::Pointer(node.compiler_type, PointerKind::Pointer)
    );
    assert_eq!(tag.fields[1].access, AccessType::Public);

    let layout = tag.layout.as_ref().unwrap();
    assert_eq!(layout.byte_size, 16);
    assert_eq!(
        layout.field_offsets,
        [("next".to_string(), 0), ("value".to_string(), 64)]
    );

    // A second completion adds nothing.
    assert!(sf.complete_type(&node.compiler_type));
    let tag = sf.type_system().tag(node.compiler_type);
    assert_eq!(tag.times_completed, 1);
    assert_eq!(tag.fields.len(), 2);
}

#[test]
fn array_element_count() {
    let mut b = PdbBuilder::new();
    let good = b.tpi.array(TypeIndex::T_INT4, 40);
    let bad = b.tpi.array(TypeIndex::T_INT4, 42);
    let image = b.build();

    let mut sf = open(&image);
    let int = sf.get_or_create_type(tpi(TypeIndex::T_INT4)).unwrap();
    let arr = sf.get_or_create_type(tpi(good)).unwrap();
    assert_eq!(arr.byte_size, 40);
    assert_eq!(arr.name, "");
    assert_eq!(arr.encoding_uid, Some(int.uid));
    assert_eq!(
        sf.type_system().types[arr.compiler_type],
        ModelType::Array {
            element: int.compiler_type,
            count: 10
        }
    );

    assert!(sf.get_or_create_type(tpi(bad)).is_none());
    // The failure is local to the bad record.
    assert!(sf.get_or_create_type(tpi(good)).is_some());
}

#[test]
fn nested_class_context() {
    let mut b = PdbBuilder::new();
    let inner_fl = b.tpi.field_list(|f| f.member(TypeIndex::T_INT4, 0, "i"));
    let inner = b.tpi.struct_full(
        Leaf::LF_STRUCTURE,
        "Outer::Inner",
        Some(".?AUInner@Outer@@"),
        inner_fl,
        4,
    );
    let outer_fl = b.tpi.field_list(|f| {
        f.nested_type(inner, "Inner");
        f.nested_type(TypeIndex::T_INT4, "Alias");
        f.member(inner, 0, "inner");
    });
    let outer = b.tpi.struct_full(Leaf::LF_STRUCTURE, "Outer", Some(".?AUOuter@@"), outer_fl, 4);
    let image = b.build();

    let mut sf = open(&image);
    let inner_t = sf.get_or_create_type(tpi(inner)).unwrap();
    let outer_t = sf.get_or_create_type(tpi(outer)).unwrap();

    let ts = sf.type_system();
    let outer_tag = ts.get_as_tag_decl(&outer_t.compiler_type).unwrap();
    let inner_decl = ts.tag(inner_t.compiler_type);
    assert_eq!(inner_decl.name, "Inner");
    assert_eq!(inner_decl.context, Context::Tag(outer_tag));
    assert_eq!(ts.context_path(inner_decl.context), "Outer");
    assert!(ts.namespaces.is_empty());

    assert!(sf.complete_type(&outer_t.compiler_type));
    let ts = sf.type_system();
    let outer_decl = ts.tag(outer_t.compiler_type);
    // The definition of Inner is not repeated as a nested type; the alias is.
    assert_eq!(outer_decl.nested.len(), 1);
    assert_eq!(outer_decl.nested[0].0, "Alias");
    assert_eq!(outer_decl.fields.len(), 1);
    assert_eq!(outer_decl.fields[0].ty, inner_t.compiler_type);
}

#[test]
fn namespace_context() {
    let mut b = PdbBuilder::new();
    let fl = b.tpi.field_list(|_| {});
    let foo = b.tpi.struct_full(
        Leaf::LF_CLASS,
        "ns1::ns2::Foo",
        Some(".?AVFoo@ns2@ns1@@"),
        fl,
        1,
    );
    let bar = b.tpi.struct_full(Leaf::LF_CLASS, "ns1::Bar", Some(".?AVBar@ns1@@"), fl, 1);
    let image = b.build();

    let mut sf = open(&image);
    let foo_t = sf.get_or_create_type(tpi(foo)).unwrap();
    let bar_t = sf.get_or_create_type(tpi(bar)).unwrap();

    let ts = sf.type_system();
    assert_eq!(foo_t.name, "Foo");
    assert_eq!(ts.namespaces.len(), 2);
    let foo_decl = ts.tag(foo_t.compiler_type);
    assert_eq!(ts.context_path(foo_decl.context), "ns1::ns2");
    assert_eq!(foo_decl.access, AccessType::Private);
    assert_eq!(foo_decl.kind, Some(TagKind::Class));

    // ns1 is shared.
    let bar_decl = ts.tag(bar_t.compiler_type);
    assert_eq!(bar_decl.context, Context::Namespace(0));
}

#[test]
fn templated_scope_is_flattened() {
    let mut b = PdbBuilder::new();
    let fl = b.tpi.field_list(|_| {});
    let t = b.tpi.struct_full(
        Leaf::LF_STRUCTURE,
        "Outer<int>::Inner",
        Some(".?AUInner@?$Outer@H@@"),
        fl,
        1,
    );
    let image = b.build();

    let mut sf = open(&image);
    let ty = sf.get_or_create_type(tpi(t)).unwrap();
    let ts = sf.type_system();
    assert_eq!(ty.name, "Outer<int>::Inner");
    assert_eq!(ts.tag(ty.compiler_type).context, Context::TranslationUnit);
    assert!(ts.namespaces.is_empty());
}

#[test]
fn undecorated_name_context() {
    let mut b = PdbBuilder::new();
    let fl = b.tpi.field_list(|_| {});
    let t = b.tpi.struct_full(Leaf::LF_STRUCTURE, "a::b::C", None, fl, 1);
    let image = b.build();

    let mut sf = open(&image);
    let ty = sf.get_or_create_type(tpi(t)).unwrap();
    let ts = sf.type_system();
    assert_eq!(ty.name, "C");
    assert_eq!(ts.context_path(ts.tag(ty.compiler_type).context), "a::b");
}

#[test]
fn constant_value() {
    let mut b = PdbBuilder::new();
    let off = b.globals.constant(TypeIndex::T_INT4, -42, "kAnswer");
    let big = b.globals.constant_unsigned(TypeIndex::T_UINT8, 0xffff_ffff_ffff_fff0, "kBig");
    let image = b.build();

    let mut sf = open(&image);
    let v = sf
        .get_or_create_global_variable(PdbGlobalSymId {
            offset: off,
            is_public: false,
        })
        .unwrap();
    assert_eq!(v.name, "kAnswer");
    assert_eq!(v.qualified_name, "::kAnswer");
    assert_eq!(v.scope, VariableScope::Global);
    assert_eq!(v.type_uid, PdbSymUid::from(tpi(TypeIndex::T_INT4)));
    assert!(v.location.is_constant());
    let VariableLocation::ConstantValueData(bytes) = &v.location else {
        panic!("expected constant data");
    };
    assert_eq!(bytes.len(), 4);
    assert_eq!(i32::from_le_bytes(bytes[..].try_into().unwrap()), -42);

    let v = sf
        .get_or_create_global_variable(PdbGlobalSymId {
            offset: big,
            is_public: false,
        })
        .unwrap();
    let VariableLocation::ConstantValueData(bytes) = &v.location else {
        panic!("expected constant data");
    };
    assert_eq!(
        u64::from_le_bytes(bytes[..].try_into().unwrap()),
        0xffff_ffff_ffff_fff0
    );
}

#[test]
fn constant_of_self_referential_modifier() {
    let mut b = PdbBuilder::new();
    let m = b.tpi.modifier(TypeIndex(0x1000), true, false);
    assert_eq!(m, TypeIndex(0x1000));
    let off = b.globals.constant(m, 7, "kSelf");
    let image = b.build();

    let mut sf = open(&image);
    let v = sf
        .get_or_create_global_variable(PdbGlobalSymId {
            offset: off,
            is_public: false,
        })
        .unwrap();
    assert_eq!(v.name, "kSelf");
    // The size comes from the encoded value instead of the type.
    let VariableLocation::ConstantValueData(bytes) = &v.location else {
        panic!("expected constant data");
    };
    assert_eq!(bytes[..], [7, 0]);

    // The type itself cannot be represented.
    assert!(sf.get_or_create_type(tpi(m)).is_none());
}

#[test]
fn deeply_nested_unique_name() {
    let mut unique = String::from(".?AU?$A@");
    for _ in 0..20000 {
        unique.push_str("PEA");
    }
    unique.push_str("H@@");

    let mut b = PdbBuilder::new();
    let fl = b.tpi.field_list(|_| {});
    let t = b.tpi.struct_full(Leaf::LF_STRUCTURE, "A<int *>", Some(&unique), fl, 1);
    let image = b.build();

    let mut sf = open(&image);
    let ty = sf.get_or_create_type(tpi(t)).unwrap();
    assert_eq!(ty.name, "A<int *>");
    assert_eq!(sf.type_system().tag(ty.compiler_type).context, Context::TranslationUnit);
}

#[test]
fn global_data_variables() {
    let mut b = PdbBuilder::new();
    let data = b.section(".data", 0x2000, 0x1000);
    let m = b.module("a.obj", &SymbolsBuilder::new_module(), &LineDataBuilder::new());
    b.contribution(data, 0, 0x100, m);
    let g = b.globals.gdata32(TypeIndex::T_INT4, data, 0x10, "g_count");
    let s = b.globals.ldata32(TypeIndex::T_INT4, data, 0x20, "s_count");
    let t = b.globals.gthread32(TypeIndex::T_INT4, data, 0x8, "t_count");
    let _ = b.globals.gdata32(TypeIndex::T_INT4, 9, 0x10, "bad_section");
    let image = b.build();

    let mut sf = open(&image);

    let v = sf
        .get_or_create_global_variable(PdbGlobalSymId {
            offset: g,
            is_public: false,
        })
        .unwrap();
    assert_eq!(v.scope, VariableScope::Global);
    assert!(v.is_external);
    assert_eq!(v.compile_unit, Some(PdbCompilandId { modi: m }.into()));
    // DW_OP_addr 0x1_4000_2010
    let expected = hex!("03 10 20 00 40 01 00 00 00");
    let VariableLocation::Expression(expr) = &v.location else {
        panic!("expected a location expression");
    };
    assert_eq!(expr[..], expected, "{:?}", expr.hex_dump());

    let v = sf
        .get_or_create_global_variable(PdbGlobalSymId {
            offset: s,
            is_public: false,
        })
        .unwrap();
    assert_eq!(v.scope, VariableScope::Static);
    assert!(!v.is_external);

    let v = sf
        .get_or_create_global_variable(PdbGlobalSymId {
            offset: t,
            is_public: false,
        })
        .unwrap();
    assert_eq!(v.scope, VariableScope::ThreadLocal);
    assert_eq!(
        v.location,
        VariableLocation::Expression(vec![
            symbols::DW_OP_CONST4U,
            8,
            0,
            0,
            0,
            symbols::DW_OP_FORM_TLS_ADDRESS
        ])
    );

    let found = sf.find_global_variables("bad_section", 0);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].location, VariableLocation::Expression(Vec::new()));

    let found = sf.find_global_variables("g_count", 0);
    assert_eq!(found.len(), 1);
    assert!(Rc::ptr_eq(
        &found[0],
        &sf.get_or_create_global_variable(PdbGlobalSymId {
            offset: g,
            is_public: false
        })
        .unwrap()
    ));
    assert!(sf.find_global_variables("nope", 0).is_empty());
}

/// One module with a function `main` at `.text+0x20` and line information for it.
fn build_program() -> (Vec<u8>, u32) {
    let mut b = PdbBuilder::new();
    let text = b.section(".text", 0x1000, 0x1000);

    let cwd = b.ipi.string_id("C:\\src");
    let tool = b.ipi.string_id("cl.exe");
    let source = b.ipi.string_id("main.cpp");
    let pdb = b.ipi.string_id("main.pdb");
    let args = b.ipi.string_id("-Zi");
    let build_info = b.ipi.build_info(&[cwd, tool, source, pdb, args]);

    let proc_type = b.tpi.procedure(TypeIndex::T_VOID, 0, &[]);

    let mut syms = SymbolsBuilder::new_module();
    syms.objname("C:\\src\\main.obj");
    // language C++, LTCG
    syms.compile3(0x01 | (1 << 10), "test compiler");
    syms.buildinfo(build_info);
    let main = syms.gproc32(proc_type, text, 0x20, 0x30, "main");
    syms.end();

    let file = b.names.add("C:\\src\\main.cpp");
    let mut lines = LineDataBuilder::new();
    let file_index = lines.file_checksum(file.0);
    // A header with declarations only.
    let header = b.names.add("C:\\src\\main.h");
    lines.file_checksum(header.0);
    lines.lines(text, 0x20, 0x30, |blk| blk.block(file_index, &[(0, 10), (0x10, 11)]));

    let m = b.module("C:\\src\\main.obj", &syms, &lines);
    b.contribution(text, 0, 0x100, m);
    b.globals.procref(main, m + 1, "main");

    (b.build(), main)
}

#[test]
fn compile_units() {
    let (image, _) = build_program();
    let mut sf = open(&image);

    assert_eq!(sf.num_compile_units(), 1);
    assert!(sf.compile_unit_at_index(1).is_none());

    let cu = sf.compile_unit_at_index(0).unwrap();
    assert_eq!(cu.modi, 0);
    assert_eq!(cu.name, "C:\\src\\main.obj");
    assert_eq!(cu.main_file, "C:\\src\\main.cpp");
    assert_eq!(cu.language, Language::CPlusPlus);
    assert!(cu.is_optimized);
    assert!(Rc::ptr_eq(
        &cu,
        &sf.get_or_create_compile_unit(PdbCompilandId { modi: 0 }).unwrap()
    ));
}

#[test]
fn functions() {
    let (image, main) = build_program();
    let mut sf = open(&image);

    let f = sf
        .get_or_create_function(PdbCompilandSymId {
            modi: 0,
            offset: main,
        })
        .unwrap();
    assert_eq!(f.name, "main");
    assert_eq!(f.range, LOAD_ADDRESS + 0x1020..LOAD_ADDRESS + 0x1050);
    assert_eq!(f.compile_unit, PdbCompilandId { modi: 0 }.into());
    assert_eq!(f.signature_uid, PdbSymUid::from(tpi(TypeIndex::T_NOTYPE)));

    let found = sf.find_functions("main", 0);
    assert_eq!(found.len(), 1);
    assert!(Rc::ptr_eq(found[0].function.as_ref().unwrap(), &f));
    assert_eq!(found[0].compile_unit.as_ref().unwrap().modi, 0);
    assert!(sf.find_functions("missing", 0).is_empty());
}

#[test]
fn symbol_context_for_address() {
    let (image, _) = build_program();
    let mut sf = open(&image);

    let all = SymbolContextItem::COMPILE_UNIT
        | SymbolContextItem::FUNCTION
        | SymbolContextItem::LINE_ENTRY;
    let (sc, resolved) = sf.resolve_symbol_context(LOAD_ADDRESS + 0x1035, all);
    assert_eq!(resolved, all);
    assert_eq!(sc.compile_unit.unwrap().modi, 0);
    assert_eq!(sc.function.unwrap().name, "main");
    let entry = sc.line_entry.unwrap();
    assert_eq!(entry.line, 11);
    assert_eq!(entry.address, LOAD_ADDRESS + 0x1030);
    assert_eq!(sc.line_file.unwrap(), "C:\\src\\main.cpp");

    // Only the compile unit is implied.
    let (sc, resolved) =
        sf.resolve_symbol_context(LOAD_ADDRESS + 0x1010, SymbolContextItem::FUNCTION);
    assert_eq!(resolved, SymbolContextItem::COMPILE_UNIT);
    assert!(sc.function.is_none());

    let (_, resolved) = sf.resolve_symbol_context(LOAD_ADDRESS + 0x5000, all);
    assert!(resolved.is_empty());
}

#[test]
fn support_files() {
    let (image, _) = build_program();
    let mut sf = open(&image);

    let files = sf.support_files(PdbCompilandId { modi: 0 }).unwrap();
    assert_eq!(files, ["C:\\src\\main.cpp", "C:\\src\\main.h"]);

    let table = sf.line_table(PdbCompilandId { modi: 0 }).unwrap();
    assert_eq!(table.files(), ["C:\\src\\main.cpp"]);

    assert!(sf.support_files(PdbCompilandId { modi: 9 }).is_none());
}

fn open_at(image: &[u8], load_address: u64) -> SymbolFile<'_, ModelTypeSystem> {
    SymbolFile::open(
        image,
        ModelTypeSystem::default(),
        SymbolFileOptions::default().with_load_address(load_address),
    )
    .unwrap()
}

#[test]
fn load_address_wraps() {
    let (image, main) = build_program();
    // .text starts at the top of the address space and wraps to 0.
    let mut sf = open_at(&image, 0u64.wrapping_sub(0x1000));

    let f = sf
        .get_or_create_function(PdbCompilandSymId {
            modi: 0,
            offset: main,
        })
        .unwrap();
    assert_eq!(f.range, 0x20..0x50);

    let all = SymbolContextItem::COMPILE_UNIT
        | SymbolContextItem::FUNCTION
        | SymbolContextItem::LINE_ENTRY;
    let (sc, resolved) = sf.resolve_symbol_context(0x35, all);
    assert_eq!(resolved, all);
    assert_eq!(sc.function.unwrap().name, "main");
    assert_eq!(sc.line_entry.unwrap().address, 0x30);
}

#[test]
fn code_past_end_of_address_space() {
    let (image, main) = build_program();
    // main starts 0x10 bytes below the top of the address space and is 0x30 bytes long.
    let mut sf = open_at(&image, 0u64.wrapping_sub(0x1030));

    assert!(
        sf.get_or_create_function(PdbCompilandSymId {
            modi: 0,
            offset: main,
        })
        .is_none()
    );
    let (_, resolved) = sf.resolve_symbol_context(u64::MAX - 0x8, SymbolContextItem::FUNCTION);
    assert!(resolved.is_empty());
    assert!(!sf.line_table(PdbCompilandId { modi: 0 }).unwrap().is_empty());
}

#[test]
fn identity() {
    let mut b = PdbBuilder::new();
    b.age = 7;
    let guid = b.guid;
    let image = b.build();
    let sf = open(&image);
    assert_eq!(sf.guid(), guid);
    assert_eq!(sf.age(), 7);
}

#[test]
fn simple_types() {
    let image = PdbBuilder::new().build();
    let mut sf = open(&image);

    let int = sf.get_or_create_type(tpi(TypeIndex::T_INT4)).unwrap();
    assert_eq!(int.name, "int");
    assert_eq!(int.byte_size, 4);
    assert_eq!(int.resolve_state(), ResolveState::Full);

    let p = sf.get_or_create_type(tpi(TypeIndex::T_64PINT4)).unwrap();
    assert_eq!(p.name, "");
    assert_eq!(p.byte_size, 8);
    assert_eq!(
        sf.type_system().types[p.compiler_type],
        ModelType::Pointer(int.compiler_type, PointerKind::Pointer)
    );

    let n = sf.get_or_create_type(tpi(TypeIndex::T_NULLPTR)).unwrap();
    assert_eq!(n.name, "std::nullptr_t");
    assert_eq!(n.byte_size, 0);

    assert!(sf.get_or_create_type(tpi(TypeIndex::T_NOTYPE)).is_none());
    assert!(Rc::ptr_eq(
        &int,
        &sf.resolve_type_uid(tpi(TypeIndex::T_INT4).into()).unwrap()
    ));
}

#[test]
fn modifiers_and_references() {
    let mut b = PdbBuilder::new();
    let fl = b.tpi.field_list(|_| {});
    let s = b.tpi.struct_full(Leaf::LF_STRUCTURE, "S", Some(".?AUS@@"), fl, 12);
    let const_int = b.tpi.modifier(TypeIndex::T_INT4, true, false);
    let cv_s = b.tpi.modifier(s, true, true);
    let lref = b.tpi.pointer(s, 1, 8);
    let rref = b.tpi.pointer(s, 4, 8);
    let image = b.build();

    let mut sf = open(&image);
    let int = sf.get_or_create_type(tpi(TypeIndex::T_INT4)).unwrap();
    let s_t = sf.get_or_create_type(tpi(s)).unwrap();

    let ci = sf.get_or_create_type(tpi(const_int)).unwrap();
    assert_eq!(ci.name, "int");
    assert_eq!(ci.byte_size, 4);
    assert_eq!(
        sf.type_system().types[ci.compiler_type],
        ModelType::Qualified(int.compiler_type, Qualifiers::CONST)
    );

    let cvs = sf.get_or_create_type(tpi(cv_s)).unwrap();
    assert_eq!(cvs.name, "S");
    assert_eq!(cvs.byte_size, 12);
    assert_eq!(
        sf.type_system().types[cvs.compiler_type],
        ModelType::Qualified(s_t.compiler_type, Qualifiers::CONST | Qualifiers::VOLATILE)
    );

    // Completing through the qualified type completes S.
    assert!(sf.complete_type(&cvs.compiler_type));
    assert_eq!(s_t.resolve_state(), ResolveState::Full);

    let l = sf.get_or_create_type(tpi(lref)).unwrap();
    let r = sf.get_or_create_type(tpi(rref)).unwrap();
    let ts = sf.type_system();
    assert_eq!(
        ts.types[l.compiler_type],
        ModelType::Pointer(s_t.compiler_type, PointerKind::LValueReference)
    );
    assert_eq!(
        ts.types[r.compiler_type],
        ModelType::Pointer(s_t.compiler_type, PointerKind::RValueReference)
    );
}

#[test]
fn member_pointer_leaves_class_forward() {
    let mut b = PdbBuilder::new();
    let fl = b.tpi.field_list(|f| f.member(TypeIndex::T_INT4, 0, "x"));
    let c = b.tpi.struct_full(Leaf::LF_CLASS, "C", Some(".?AVC@@"), fl, 4);
    let mp = b.tpi.member_pointer(TypeIndex::T_INT4, c, true);
    let image = b.build();

    let mut sf = open(&image);
    let t = sf.get_or_create_type(tpi(mp)).unwrap();
    let c_t = sf.get_or_create_type(tpi(c)).unwrap();
    let int = sf.get_or_create_type(tpi(TypeIndex::T_INT4)).unwrap();

    assert_eq!(t.byte_size, 8);
    assert_eq!(
        sf.type_system().types[t.compiler_type],
        ModelType::MemberPointer {
            class: c_t.compiler_type,
            pointee: int.compiler_type
        }
    );
    assert_eq!(c_t.resolve_state(), ResolveState::Forward);
    assert_eq!(sf.type_system().tag(c_t.compiler_type).times_completed, 0);

    assert!(sf.complete_type(&c_t.compiler_type));
    assert_eq!(sf.type_system().tag(c_t.compiler_type).times_completed, 1);
}

#[test]
fn member_pointer_into_own_class() {
    // struct S { int S::*p; int x; };
    let mut b = PdbBuilder::new();
    let fwd = b.tpi.struct_forward(Leaf::LF_STRUCTURE, "S", Some(".?AUS@@"));
    let mp = b.tpi.member_pointer(TypeIndex::T_INT4, fwd, true);
    let fl = b.tpi.field_list(|f| {
        f.member(mp, 0, "p");
        f.member(TypeIndex::T_INT4, 4, "x");
    });
    let full = b.tpi.struct_full(Leaf::LF_STRUCTURE, "S", Some(".?AUS@@"), fl, 8);
    let image = b.build();

    let mut sf = open(&image);
    let p = sf.get_or_create_type(tpi(mp)).unwrap();
    let s_t = sf.get_or_create_type(tpi(full)).unwrap();
    assert!(sf.complete_type(&s_t.compiler_type));

    let ts = sf.type_system();
    let tag = ts.tag(s_t.compiler_type);
    let names: Vec<&str> = tag.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["p", "x"]);
    assert_eq!(tag.fields[0].ty, p.compiler_type);
}

#[test]
fn procedures() {
    let mut b = PdbBuilder::new();
    let variadic = b.tpi.procedure(
        TypeIndex::T_INT4,
        CallingConvention::NEAR_C.0,
        &[TypeIndex::T_32PVOID, TypeIndex::T_NOTYPE],
    );
    let stdcall = b.tpi.procedure(TypeIndex::T_VOID, CallingConvention::NEAR_STD.0, &[]);
    let unsupported = b.tpi.procedure(TypeIndex::T_VOID, CallingConvention::CLRCALL.0, &[]);
    let image = b.build();

    let mut sf = open(&image);
    let int = sf.get_or_create_type(tpi(TypeIndex::T_INT4)).unwrap();
    let pvoid = sf.get_or_create_type(tpi(TypeIndex::T_32PVOID)).unwrap();

    let f = sf.get_or_create_type(tpi(variadic)).unwrap();
    assert_eq!(f.byte_size, 0);
    assert_eq!(
        sf.type_system().types[f.compiler_type],
        ModelType::Function {
            ret: int.compiler_type,
            args: vec![pvoid.compiler_type],
            is_variadic: true,
            calling_conv: CallingConv::C,
        }
    );

    let f = sf.get_or_create_type(tpi(stdcall)).unwrap();
    let ModelType::Function {
        calling_conv,
        is_variadic,
        ..
    } = &sf.type_system().types[f.compiler_type]
    else {
        panic!("expected a function type");
    };
    assert_eq!(*calling_conv, CallingConv::X86StdCall);
    assert!(!is_variadic);

    assert!(sf.get_or_create_type(tpi(unsupported)).is_none());
}

#[test]
fn class_members() {
    let mut b = PdbBuilder::new();
    let empty = b.tpi.field_list(|_| {});
    let base1 = b.tpi.struct_full(Leaf::LF_STRUCTURE, "B1", Some(".?AUB1@@"), empty, 4);
    let base2 = b.tpi.struct_full(Leaf::LF_STRUCTURE, "B2", Some(".?AUB2@@"), empty, 4);
    let bits = b.tpi.bitfield(TypeIndex::T_UINT4, 3, 5);

    let cls_fwd = b.tpi.struct_forward(Leaf::LF_CLASS, "D", Some(".?AVD@@"));
    let this = b.tpi.pointer(cls_fwd, 0, 8);
    let method = b
        .tpi
        .member_function(TypeIndex::T_VOID, cls_fwd, this, CallingConvention::THISCALL.0, &[]);
    let overload = b.tpi.member_function(
        TypeIndex::T_VOID,
        cls_fwd,
        this,
        CallingConvention::THISCALL.0,
        &[TypeIndex::T_INT4],
    );
    // public (3) | static (2 << 2)
    let statik = 3 | (2 << 2);
    // public (3) | introducing virtual (4 << 2)
    let intro_virtual = 3 | (4 << 2);
    let overloads = b.tpi.method_list(&[(3, method), (statik, overload)]);

    let fl = b.tpi.field_list(|f| {
        f.base_class(base1, 0);
        f.base_class(base2, 4);
        // no access specified
        f.member_with_attr(0, TypeIndex::T_INT4, 8, "hidden");
        f.member(bits, 12, "flags");
        f.static_member(TypeIndex::T_INT4, "count");
        f.one_method(intro_virtual, method, "run");
        f.method(2, overloads, "go");
    });
    let cls = b.tpi.struct_full(Leaf::LF_CLASS, "D", Some(".?AVD@@"), fl, 16);
    let image = b.build();

    let mut sf = open(&image);
    let d = sf.get_or_create_type(tpi(cls)).unwrap();
    let b1 = sf.get_or_create_type(tpi(base1)).unwrap();
    assert!(sf.complete_type(&d.compiler_type));

    let ts = sf.type_system();
    let tag = ts.tag(d.compiler_type);
    assert_eq!(tag.inheritance, Some(MsInheritance::Multiple));
    assert_eq!(tag.bases.len(), 2);
    assert_eq!(tag.bases[0].ty, b1.compiler_type);
    assert!(!tag.bases[0].is_virtual);

    assert_eq!(tag.fields.len(), 2);
    assert_eq!(tag.fields[0].access, AccessType::Private);
    assert_eq!(tag.fields[1].name, "flags");
    assert_eq!(tag.fields[1].bit_width, Some(3));
    assert_eq!(tag.static_members.len(), 1);
    assert_eq!(tag.static_members[0].name, "count");

    let names: Vec<&str> = tag.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["run", "go", "go"]);
    assert!(tag.methods[0].attributes.is_virtual);
    assert!(!tag.methods[1].attributes.is_static);
    assert!(tag.methods[2].attributes.is_static);

    let layout = tag.layout.as_ref().unwrap();
    assert_eq!(
        layout.field_offsets,
        [("hidden".to_string(), 64), ("flags".to_string(), 12 * 8 + 5)]
    );
    assert_eq!(layout.base_offsets.len(), 2);
    assert_eq!(layout.base_offsets[1].1, 4);
}

#[test]
fn virtual_inheritance() {
    let mut b = PdbBuilder::new();
    let empty = b.tpi.field_list(|_| {});
    let base = b.tpi.struct_full(Leaf::LF_STRUCTURE, "V", Some(".?AUV@@"), empty, 4);
    let vbptr = b.tpi.pointer(TypeIndex::T_INT4, 0, 8);
    let fl = b.tpi.field_list(|f| f.virtual_base_class(base, vbptr));
    let s = b.tpi.struct_full(Leaf::LF_STRUCTURE, "S", Some(".?AUS@@"), fl, 16);
    let image = b.build();

    let mut sf = open(&image);
    let t = sf.get_or_create_type(tpi(s)).unwrap();
    assert_eq!(
        sf.type_system().tag(t.compiler_type).inheritance,
        Some(MsInheritance::Virtual)
    );
    assert!(sf.complete_type(&t.compiler_type));
    let tag = sf.type_system().tag(t.compiler_type);
    assert_eq!(tag.bases.len(), 1);
    assert!(tag.bases[0].is_virtual);
}

#[test]
fn enums() {
    let mut b = PdbBuilder::new();
    let fl = b.tpi.field_list(|f| {
        f.enumerate(-1, "Neg");
        f.enumerate(2, "Two");
    });
    let color = b.tpi.enum_full("Color", Some(".?AW4Color@@"), TypeIndex::T_INT4, fl);
    let fl = b.tpi.field_list(|f| f.enumerate(0xffff_ffff, "All"));
    let flags = b.tpi.enum_full("Flags", Some(".?AW4Flags@@"), TypeIndex::T_UINT4, fl);
    let image = b.build();

    let mut sf = open(&image);
    let int = sf.get_or_create_type(tpi(TypeIndex::T_INT4)).unwrap();
    let c = sf.get_or_create_type(tpi(color)).unwrap();
    assert_eq!(c.byte_size, 4);
    assert_eq!(c.resolve_state(), ResolveState::Forward);
    assert_eq!(
        sf.type_system().tag(c.compiler_type).enum_underlying,
        Some(int.compiler_type)
    );
    assert!(sf.complete_type(&c.compiler_type));
    assert_eq!(
        sf.type_system().tag(c.compiler_type).enumerators,
        [("Neg".to_string(), -1), ("Two".to_string(), 2)]
    );

    let f = sf.get_or_create_type(tpi(flags)).unwrap();
    assert!(sf.complete_type(&f.compiler_type));
    assert_eq!(
        sf.type_system().tag(f.compiler_type).enumerators,
        [("All".to_string(), 0xffff_ffff)]
    );
}

#[test]
fn find_types_by_name_limits() {
    let mut b = PdbBuilder::new();
    let fl = b.tpi.field_list(|_| {});
    let _ = b.tpi.struct_full(Leaf::LF_STRUCTURE, "Dup", Some(".?AUDup@a@@"), fl, 1);
    let _ = b.tpi.struct_full(Leaf::LF_STRUCTURE, "Dup", Some(".?AUDup@b@@"), fl, 1);
    let image = b.build();

    let mut sf = open(&image);
    assert_eq!(sf.find_types_by_name("Dup", 1).len(), 1);
    assert_eq!(sf.find_types_by_name("Dup", 0).len(), 2);
    assert!(sf.find_types_by_name("Missing", 0).is_empty());
}

#[test]
#[should_panic]
fn resolve_type_uid_rejects_other_kinds() {
    let image = PdbBuilder::new().build();
    let mut sf = open(&image);
    sf.resolve_type_uid(PdbCompilandId { modi: 0 }.into());
}

#[test]
#[should_panic]
fn complete_type_rejects_foreign_declarations() {
    let image = PdbBuilder::new().build();
    let mut sf = open(&image);
    let ts = sf.type_system_mut();
    let tu = ts.translation_unit_decl();
    let ct = ts.create_record_type(
        &tu,
        AccessType::Public,
        "Foreign",
        TagKind::Struct,
        &RecordMetadata {
            uid: PdbSymUid(0),
            inheritance: MsInheritance::Single,
        },
    );
    sf.complete_type(&ct);
}
